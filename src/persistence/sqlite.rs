//! SQLite-backed ledger store
//!
//! One connection behind a mutex, WAL journal. Every `transact` call is a
//! `BEGIN IMMEDIATE` transaction, so the write lock is taken before the
//! snapshot is read. A busy database (another process holding the lock past
//! the busy timeout) surfaces as a conflict for the ledger to retry.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};

use super::{LedgerStore, PlayerTxn, TxnWrites};
use crate::calendar::{WeekId, date_key, parse_date_key};
use crate::error::{LedgerError, StoreError};
use crate::ledger::{
    ActiveEntry, Amount, ClaimRecord, ClaimState, DailyScore, PayoutRow, PlayerId, PlayerProfile,
    WeekPool,
};
use crate::sim::Phase;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS players (
        id                    INTEGER PRIMARY KEY,
        display_name          TEXT,
        avatar_url            TEXT,
        wallet_address        TEXT,
        lives_balance         INTEGER NOT NULL DEFAULT 0,
        weekly_score          INTEGER NOT NULL DEFAULT 0,
        last_active_week      TEXT,
        previous_weekly_score INTEGER NOT NULL DEFAULT 0,
        previous_active_week  TEXT,
        lifetime_earnings     INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_players_live
        ON players(last_active_week, weekly_score DESC, id);
    CREATE INDEX IF NOT EXISTS idx_players_previous
        ON players(previous_active_week, previous_weekly_score DESC, id);

    CREATE TABLE IF NOT EXISTS daily_scores (
        player_id   INTEGER NOT NULL,
        day         TEXT NOT NULL,
        best_score  INTEGER NOT NULL,
        mode        TEXT NOT NULL,
        recorded_at INTEGER NOT NULL,
        PRIMARY KEY (player_id, day)
    );

    CREATE TABLE IF NOT EXISTS claims (
        player_id INTEGER NOT NULL,
        week      TEXT NOT NULL,
        amount    INTEGER NOT NULL,
        state     TEXT NOT NULL,
        tx_ref    TEXT,
        PRIMARY KEY (player_id, week)
    );

    CREATE TABLE IF NOT EXISTS life_credits (
        player_id    INTEGER NOT NULL,
        purchase_ref TEXT NOT NULL,
        PRIMARY KEY (player_id, purchase_ref)
    );

    CREATE TABLE IF NOT EXISTS week_pools (
        week       TEXT PRIMARY KEY,
        pool_total INTEGER NOT NULL DEFAULT 0,
        sessions   INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS frozen_weeks (
        week      TEXT PRIMARY KEY,
        frozen_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS week_payouts (
        week      TEXT NOT NULL,
        rank      INTEGER NOT NULL,
        player_id INTEGER NOT NULL,
        amount    INTEGER NOT NULL,
        PRIMARY KEY (week, rank)
    );";

/// Ledger store in a SQLite database file
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| {
            StoreError::Backend(format!("failed to open SQLite at {}: {e}", path.display()))
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;
             PRAGMA synchronous=NORMAL;",
        )?;
        Self::init(conn)
    }

    /// Private database, gone when dropped
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        log::info!("SQLite ledger store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// How long to wait on another writer before reporting a conflict
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<(), StoreError> {
        self.lock()?.busy_timeout(timeout)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".into()))
    }
}

fn map_busy(player: PlayerId) -> impl Fn(rusqlite::Error) -> StoreError {
    move |e| match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            StoreError::Conflict(player)
        }
        _ => StoreError::from(e),
    }
}

fn parse_week(raw: Option<String>) -> Result<Option<WeekId>, StoreError> {
    raw.map(|s| s.parse().map_err(StoreError::Corrupt))
        .transpose()
}

fn load_profile(conn: &Connection, player: PlayerId) -> Result<Option<PlayerProfile>, StoreError> {
    let row = conn
        .query_row(
            "SELECT display_name, avatar_url, wallet_address, lives_balance,
                    weekly_score, last_active_week, previous_weekly_score,
                    previous_active_week, lifetime_earnings
             FROM players WHERE id = ?1",
            params![player.0 as i64],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            },
        )
        .optional()?;
    let Some((name, avatar, wallet, lives, weekly, live_week, prev_score, prev_week, earned)) = row
    else {
        return Ok(None);
    };

    let mut claims = BTreeMap::new();
    let mut stmt = conn.prepare(
        "SELECT week, amount, state, tx_ref FROM claims WHERE player_id = ?1",
    )?;
    let rows = stmt.query_map(params![player.0 as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;
    for row in rows {
        let (week, amount, state, tx_ref) = row?;
        let week: WeekId = week.parse().map_err(StoreError::Corrupt)?;
        let state = match (state.as_str(), tx_ref) {
            ("reserved", _) => ClaimState::Reserved,
            ("unconfirmed", _) => ClaimState::Unconfirmed,
            ("paid", Some(tx_ref)) => ClaimState::Paid { tx_ref },
            (other, _) => {
                return Err(StoreError::Corrupt(format!(
                    "claim {week} of player {player} has state {other:?}"
                )));
            }
        };
        claims.insert(
            week,
            ClaimRecord {
                amount: Amount::from_minor(amount as u64),
                state,
            },
        );
    }

    let mut stmt =
        conn.prepare("SELECT purchase_ref FROM life_credits WHERE player_id = ?1")?;
    let credited_purchases: BTreeSet<String> = stmt
        .query_map(params![player.0 as i64], |row| row.get::<_, String>(0))?
        .collect::<Result<_, _>>()?;

    Ok(Some(PlayerProfile {
        id: player,
        display_name: name,
        avatar_url: avatar,
        wallet_address: wallet,
        lives_balance: lives as u32,
        weekly_score: weekly as u64,
        last_active_week: parse_week(live_week)?,
        previous_weekly_score: prev_score as u64,
        previous_active_week: parse_week(prev_week)?,
        claims,
        lifetime_earnings: Amount::from_minor(earned as u64),
        credited_purchases,
    }))
}

fn load_dailies(
    conn: &Connection,
    player: PlayerId,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<BTreeMap<NaiveDate, DailyScore>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT day, best_score, mode, recorded_at FROM daily_scores
         WHERE player_id = ?1 AND day BETWEEN ?2 AND ?3",
    )?;
    let rows = stmt.query_map(
        params![player.0 as i64, date_key(from), date_key(to)],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        },
    )?;

    let mut out = BTreeMap::new();
    for row in rows {
        let (day, best, mode, recorded_at) = row?;
        let date = parse_date_key(&day)
            .ok_or_else(|| StoreError::Corrupt(format!("bad day key {day:?}")))?;
        let mode = Phase::from_str(&mode)
            .ok_or_else(|| StoreError::Corrupt(format!("bad mode {mode:?}")))?;
        let recorded_at = DateTime::from_timestamp_millis(recorded_at)
            .ok_or_else(|| StoreError::Corrupt(format!("bad timestamp {recorded_at}")))?;
        out.insert(
            date,
            DailyScore {
                best_score: best as u32,
                mode,
                recorded_at,
            },
        );
    }
    Ok(out)
}

fn load_pool(conn: &Connection, week: WeekId) -> Result<WeekPool, StoreError> {
    let pool = conn
        .query_row(
            "SELECT pool_total, sessions FROM week_pools WHERE week = ?1",
            params![week.to_string()],
            |row| {
                Ok(WeekPool {
                    pool_total: Amount::from_minor(row.get::<_, i64>(0)? as u64),
                    sessions: row.get::<_, i64>(1)? as u32,
                })
            },
        )
        .optional()?;
    Ok(pool.unwrap_or_default())
}

fn load_payouts(conn: &Connection, week: WeekId) -> Result<Option<Vec<PayoutRow>>, StoreError> {
    let key = week.to_string();
    let frozen = conn
        .query_row(
            "SELECT 1 FROM frozen_weeks WHERE week = ?1",
            params![key],
            |_| Ok(()),
        )
        .optional()?;
    if frozen.is_none() {
        return Ok(None);
    }
    let mut stmt = conn.prepare(
        "SELECT rank, player_id, amount FROM week_payouts WHERE week = ?1 ORDER BY rank",
    )?;
    let rows = stmt
        .query_map(params![key], |row| {
            Ok(PayoutRow {
                rank: row.get::<_, i64>(0)? as usize,
                player: PlayerId(row.get::<_, i64>(1)? as u64),
                amount: Amount::from_minor(row.get::<_, i64>(2)? as u64),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(rows))
}

fn write_all(conn: &Connection, player: PlayerId, writes: &TxnWrites) -> Result<(), StoreError> {
    let id = player.0 as i64;
    if let Some(p) = &writes.profile {
        conn.execute(
            "INSERT OR REPLACE INTO players (
                id, display_name, avatar_url, wallet_address, lives_balance,
                weekly_score, last_active_week, previous_weekly_score,
                previous_active_week, lifetime_earnings
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                p.display_name,
                p.avatar_url,
                p.wallet_address,
                p.lives_balance as i64,
                p.weekly_score as i64,
                p.last_active_week.map(|w| w.to_string()),
                p.previous_weekly_score as i64,
                p.previous_active_week.map(|w| w.to_string()),
                p.lifetime_earnings.minor() as i64,
            ],
        )?;

        conn.execute("DELETE FROM claims WHERE player_id = ?1", params![id])?;
        for (week, claim) in &p.claims {
            let (state, tx_ref) = match &claim.state {
                ClaimState::Reserved => ("reserved", None),
                ClaimState::Unconfirmed => ("unconfirmed", None),
                ClaimState::Paid { tx_ref } => ("paid", Some(tx_ref.as_str())),
            };
            conn.execute(
                "INSERT INTO claims (player_id, week, amount, state, tx_ref)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, week.to_string(), claim.amount.minor() as i64, state, tx_ref],
            )?;
        }

        for purchase in &p.credited_purchases {
            conn.execute(
                "INSERT OR IGNORE INTO life_credits (player_id, purchase_ref) VALUES (?1, ?2)",
                params![id, purchase],
            )?;
        }
    }

    for (date, score) in &writes.dailies {
        conn.execute(
            "INSERT OR REPLACE INTO daily_scores (player_id, day, best_score, mode, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                date_key(*date),
                score.best_score as i64,
                score.mode.as_str(),
                score.recorded_at.timestamp_millis(),
            ],
        )?;
    }

    if let Some((week, amount, sessions)) = writes.pool {
        conn.execute(
            "INSERT INTO week_pools (week, pool_total, sessions) VALUES (?1, ?2, ?3)
             ON CONFLICT(week) DO UPDATE SET
                pool_total = pool_total + excluded.pool_total,
                sessions = sessions + excluded.sessions",
            params![week.to_string(), amount.minor() as i64, sessions as i64],
        )?;
    }
    Ok(())
}

impl LedgerStore for SqliteStore {
    fn transact<T, F>(&self, player: PlayerId, week: Option<WeekId>, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut PlayerTxn) -> Result<T, LedgerError>,
    {
        let busy = map_busy(player);
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(&busy)?;

        let profile = load_profile(&tx, player)?;
        let (dailies, pool) = match week {
            Some(week) => {
                let dates = week.dates();
                (
                    load_dailies(&tx, player, dates[0], dates[6])?,
                    load_pool(&tx, week)?,
                )
            }
            None => (BTreeMap::new(), WeekPool::default()),
        };
        let mut txn = PlayerTxn::begin(player, week, profile, dailies, pool);

        // An error here drops `tx`, which rolls back
        let out = f(&mut txn)?;
        let writes = txn.into_writes();
        if !writes.is_empty() {
            write_all(&tx, player, &writes)?;
        }
        tx.commit().map_err(&busy)?;
        Ok(out)
    }

    fn profile(&self, player: PlayerId) -> Result<Option<PlayerProfile>, StoreError> {
        let conn = self.lock()?;
        load_profile(&conn, player)
    }

    fn daily_scores(
        &self,
        player: PlayerId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, DailyScore>, StoreError> {
        let conn = self.lock()?;
        load_dailies(&conn, player, from, to)
    }

    fn players_active_in(&self, week: WeekId) -> Result<Vec<ActiveEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, score, display_name, avatar_url FROM (
                SELECT id, weekly_score AS score, display_name, avatar_url
                FROM players WHERE last_active_week = ?1 AND weekly_score > 0
                UNION ALL
                SELECT id, previous_weekly_score AS score, display_name, avatar_url
                FROM players WHERE previous_active_week = ?1 AND previous_weekly_score > 0
             )
             ORDER BY score DESC, id ASC",
        )?;
        let rows = stmt.query_map(params![week.to_string()], |row| {
            Ok(ActiveEntry {
                player: PlayerId(row.get::<_, i64>(0)? as u64),
                score: row.get::<_, i64>(1)? as u64,
                display_name: row.get(2)?,
                avatar_url: row.get(3)?,
            })
        })?;
        let entries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn week_pool(&self, week: WeekId) -> Result<WeekPool, StoreError> {
        let conn = self.lock()?;
        load_pool(&conn, week)
    }

    fn payout_table(&self, week: WeekId) -> Result<Option<Vec<PayoutRow>>, StoreError> {
        let conn = self.lock()?;
        load_payouts(&conn, week)
    }

    fn freeze_payouts(&self, week: WeekId, rows: &[PayoutRow]) -> Result<Vec<PayoutRow>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(existing) = load_payouts(&tx, week)? {
            return Ok(existing);
        }
        let key = week.to_string();
        tx.execute(
            "INSERT INTO frozen_weeks (week, frozen_at) VALUES (?1, ?2)",
            params![key, Utc::now().timestamp_millis()],
        )?;
        for row in rows {
            tx.execute(
                "INSERT INTO week_payouts (week, rank, player_id, amount) VALUES (?1, ?2, ?3, ?4)",
                params![key, row.rank as i64, row.player.0 as i64, row.amount.minor() as i64],
            )?;
        }
        tx.commit()?;
        Ok(rows.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::ManualCalendar;
    use crate::ledger::{Ledger, PlayerIdentity};
    use crate::payout::{PaymentGateway, TransferError, TransferReceipt, claim_reward};
    use crate::settings::{EconomyConfig, PoolPolicy};
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Monday of 2025-W10
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    fn day(offset: i64) -> NaiveDate {
        monday() + chrono::Duration::days(offset)
    }

    fn file_ledger(
        path: &Path,
        config: EconomyConfig,
        calendar: &ManualCalendar,
    ) -> Ledger<SqliteStore> {
        Ledger::with_calendar(SqliteStore::open(path).unwrap(), config, calendar.clone())
    }

    struct SlowGateway {
        calls: AtomicU32,
    }

    impl PaymentGateway for SlowGateway {
        async fn transfer(
            &self,
            destination: &str,
            amount: Amount,
        ) -> Result<TransferReceipt, TransferError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(TransferReceipt {
                tx_ref: format!("tx-{n}-{destination}-{}", amount.minor()),
            })
        }
    }

    fn seed_player(store: &SqliteStore, id: u64, week: WeekId, score: u64) {
        store
            .transact(PlayerId(id), Some(week), |txn| {
                let p = txn.profile_or_insert_with(|| {
                    PlayerProfile::new(&PlayerIdentity::new(id).with_name(format!("p{id}")), 1)
                });
                p.weekly_score = score;
                p.last_active_week = Some(week);
                txn.put_daily(
                    week.monday(),
                    DailyScore {
                        best_score: score as u32,
                        mode: Phase::Hard,
                        recorded_at: Utc::now(),
                    },
                )?;
                txn.contribute_to_pool(Amount::from_minor(10))
            })
            .unwrap();
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        let week = WeekId::new(2025, 30);
        {
            let store = SqliteStore::open(&path).unwrap();
            seed_player(&store, 7, week, 120);
            store
                .transact(PlayerId(7), None, |txn| {
                    let p = txn.profile_mut().unwrap();
                    p.credited_purchases.insert("order-1".into());
                    p.claims.insert(
                        week,
                        ClaimRecord {
                            amount: Amount::from_minor(350),
                            state: ClaimState::Paid {
                                tx_ref: "0xabc".into(),
                            },
                        },
                    );
                    Ok(())
                })
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let profile = store.profile(PlayerId(7)).unwrap().unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("p7"));
        assert_eq!(profile.score_for_week(week), Some(120));
        assert!(profile.claims[&week].is_paid());
        assert!(profile.credited_purchases.contains("order-1"));

        let dailies = store
            .daily_scores(PlayerId(7), week.monday(), week.dates()[6])
            .unwrap();
        assert_eq!(dailies[&week.monday()].mode, Phase::Hard);
        assert_eq!(store.week_pool(week).unwrap().sessions, 1);
    }

    #[test]
    fn test_rollback_on_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result: Result<(), _> = store.transact(PlayerId(1), None, |txn| {
            txn.profile_or_insert_with(|| PlayerProfile::new(&PlayerIdentity::new(1), 0));
            Err(LedgerError::NotEligible("test".into()))
        });
        assert!(result.is_err());
        assert!(store.profile(PlayerId(1)).unwrap().is_none());
    }

    #[test]
    fn test_standings_query_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let week = WeekId::new(2025, 30);
        seed_player(&store, 5, week, 80);
        seed_player(&store, 2, week, 80);
        seed_player(&store, 9, week, 200);
        seed_player(&store, 4, week, 0);
        // Archived week of another player counts for that week too
        seed_player(&store, 3, week.previous(), 500);
        store
            .transact(PlayerId(3), None, |txn| {
                let p = txn.profile_mut().unwrap();
                p.previous_weekly_score = p.weekly_score;
                p.previous_active_week = p.last_active_week;
                p.weekly_score = 10;
                p.last_active_week = Some(week);
                Ok(())
            })
            .unwrap();

        let ids: Vec<u64> = store
            .players_active_in(week)
            .unwrap()
            .iter()
            .map(|e| e.player.0)
            .collect();
        assert_eq!(ids, vec![9, 2, 5, 3]);
        let previous = store.players_active_in(week.previous()).unwrap();
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].score, 500);
        assert_eq!(store.week_pool(week).unwrap().pool_total, Amount::from_minor(40));
    }

    #[test]
    fn test_ledger_week_of_daily_bests_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        let calendar = ManualCalendar::new(day(3));
        let who = PlayerIdentity::new(1).with_name("ana");
        {
            let ledger = file_ledger(&path, EconomyConfig::default(), &calendar);
            for (offset, score) in [(0, 50), (1, 80), (2, 0), (3, 120)] {
                ledger
                    .record_session_result(&who, score, Phase::Normal, day(offset))
                    .unwrap();
            }
            assert_eq!(ledger.store().profile(PlayerId(1)).unwrap().unwrap().weekly_score, 250);
        }

        // Reopened from disk, the same Thursday rules apply
        let ledger = file_ledger(&path, EconomyConfig::default(), &calendar);
        let record = ledger.record_session_result(&who, 90, Phase::Normal, day(3)).unwrap();
        assert!(!record.daily_best_updated);
        assert_eq!(ledger.store().profile(PlayerId(1)).unwrap().unwrap().weekly_score, 250);

        let record = ledger.record_session_result(&who, 150, Phase::Hard, day(3)).unwrap();
        assert_eq!(record.weekly_delta, 30);
        let profile = ledger.store().profile(PlayerId(1)).unwrap().unwrap();
        assert_eq!(profile.weekly_score, 280);
        let dailies = ledger.store().daily_scores(PlayerId(1), day(0), day(6)).unwrap();
        assert_eq!(dailies.len(), 4);
        assert_eq!(dailies[&day(3)].best_score, 150);
        assert_eq!(dailies[&day(3)].mode, Phase::Hard);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ledger_double_claim_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        let calendar = ManualCalendar::new(monday());
        let config = EconomyConfig {
            pool: PoolPolicy::Fixed {
                amount: Amount::from_minor(10_000),
            },
            ..EconomyConfig::default()
        };
        let ledger = Arc::new(file_ledger(&path, config.clone(), &calendar));
        for (id, score) in [(1u64, 300u32), (2, 200)] {
            let who = PlayerIdentity::new(id);
            ledger.record_session_result(&who, score, Phase::Normal, monday()).unwrap();
            ledger.link_wallet(&who, &format!("wallet{id}")).unwrap();
        }
        calendar.set(day(7));
        let week = WeekId::from_date(monday());
        let gateway = Arc::new(SlowGateway {
            calls: AtomicU32::new(0),
        });

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let ledger = ledger.clone();
                let gateway = gateway.clone();
                tokio::spawn(async move { claim_reward(&*ledger, &*gateway, PlayerId(1), week).await })
            })
            .collect();
        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(LedgerError::AlreadyClaimed { .. }))));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);

        // Paid claim and frozen payouts survive a reopen
        let table = ledger.payout_table(week).unwrap();
        let reopened = file_ledger(&path, config, &calendar);
        let profile = reopened.store().profile(PlayerId(1)).unwrap().unwrap();
        assert!(profile.claims[&week].is_paid());
        assert_eq!(profile.lifetime_earnings, Amount::from_minor(3_500));
        assert_eq!(reopened.store().payout_table(week).unwrap(), Some(table));
        assert_eq!(
            claim_reward(&reopened, &*gateway, PlayerId(1), week).await,
            Err(LedgerError::AlreadyClaimed { week })
        );
    }

    #[test]
    fn test_busy_database_is_a_retried_conflict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        let calendar = ManualCalendar::new(monday());
        let ledger = file_ledger(
            &path,
            EconomyConfig {
                max_txn_attempts: 3,
                ..EconomyConfig::default()
            },
            &calendar,
        );
        ledger.store().set_busy_timeout(Duration::from_millis(10)).unwrap();

        // Another process holds the write lock
        let other = Connection::open(&path).unwrap();
        other.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let who = PlayerIdentity::new(1);
        assert_eq!(
            ledger.record_session_result(&who, 40, Phase::Normal, monday()),
            Err(LedgerError::TransactionConflict { attempts: 3 })
        );

        other.execute_batch("ROLLBACK;").unwrap();
        ledger.record_session_result(&who, 40, Phase::Normal, monday()).unwrap();
        assert_eq!(ledger.store().profile(PlayerId(1)).unwrap().unwrap().weekly_score, 40);
    }
}
