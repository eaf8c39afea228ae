//! Read-only profile views

use chrono::{Datelike, NaiveDate};

use super::{DayStat, Ledger, PlayerId, ProfileSummary};
use crate::calendar::WeekId;
use crate::error::LedgerError;
use crate::persistence::LedgerStore;

impl<S: LedgerStore> Ledger<S> {
    /// Monday to Sunday of the week containing `today`
    pub fn weekly_streak(
        &self,
        player: PlayerId,
        today: NaiveDate,
    ) -> Result<Vec<DayStat>, LedgerError> {
        let dates = WeekId::from_date(today).dates();
        let dailies = self.store().daily_scores(player, dates[0], dates[6])?;
        Ok(dates
            .iter()
            .map(|date| {
                let daily = dailies.get(date);
                DayStat {
                    date: *date,
                    day_name: day_name(*date),
                    score: daily.map(|d| d.best_score).unwrap_or(0),
                    played: daily.is_some(),
                    is_today: *date == today,
                }
            })
            .collect())
    }

    /// Today's best, this week's total, lives and earnings.
    ///
    /// A player the ledger has never seen gets an all-zero summary.
    pub fn profile_summary(
        &self,
        player: PlayerId,
        today: NaiveDate,
    ) -> Result<ProfileSummary, LedgerError> {
        let profile = self.store().profile(player)?;
        let today_score = self
            .store()
            .daily_scores(player, today, today)?
            .get(&today)
            .map(|d| d.best_score)
            .unwrap_or(0);
        let week = WeekId::from_date(today);

        Ok(match profile {
            Some(p) => ProfileSummary {
                player,
                display_name: p.display_name.clone(),
                today_score,
                week_total: p.score_for_week(week).unwrap_or(0),
                lives_balance: p.lives_balance,
                lifetime_earnings: p.lifetime_earnings,
                wallet_linked: p.wallet_address.is_some(),
            },
            None => ProfileSummary {
                player,
                display_name: None,
                today_score,
                week_total: 0,
                lives_balance: self.config().starting_lives,
                lifetime_earnings: Default::default(),
                wallet_linked: false,
            },
        })
    }
}

fn day_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "Mon",
        chrono::Weekday::Tue => "Tue",
        chrono::Weekday::Wed => "Wed",
        chrono::Weekday::Thu => "Thu",
        chrono::Weekday::Fri => "Fri",
        chrono::Weekday::Sat => "Sat",
        chrono::Weekday::Sun => "Sun",
    }
}
