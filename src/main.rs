//! Snake Rush entry point
//!
//! Browser: canvas game loop with keyboard, touch and button input.
//! Native: headless run of a few autopiloted sessions through the ledger,
//! printing the week's leaderboard.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Lives granted once per day so the demo can always play
const DAILY_GRANT: u32 = 3;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::NaiveDate;
    use glam::Vec2;
    use wasm_bindgen::prelude::*;
    use web_sys::{HtmlCanvasElement, KeyboardEvent, TouchEvent};

    use snake_rush::calendar::date_key;
    use snake_rush::consts::{CANVAS_HEIGHT, CANVAS_WIDTH, CELL_SIZE};
    use snake_rush::input::{SwipeTracker, direction_for_button, direction_for_key};
    use snake_rush::persistence::MemoryStore;
    use snake_rush::platform::web::{document, now_ms, set_text, set_visible};
    use snake_rush::renderer::CanvasSurface;
    use snake_rush::session::{SessionStatus, Snapshot};
    use snake_rush::sim::Direction;
    use snake_rush::{GameSession, Ledger, LedgerError, PlayerIdentity, Settings};

    use super::DAILY_GRANT;

    struct Game {
        settings: Settings,
        session: GameSession,
        surface: CanvasSurface,
        swipe: SwipeTracker,
        last_snapshot: Option<Snapshot>,
        ledger: Ledger<MemoryStore>,
        identity: PlayerIdentity,
        /// Result already handed to the ledger
        recorded: bool,
    }

    impl Game {
        fn new(settings: Settings, surface: CanvasSurface) -> Self {
            let ledger = Ledger::new(MemoryStore::new(), settings.economy.clone());
            Self {
                session: GameSession::new(settings.game.clone(), js_sys::Date::now() as u64),
                settings,
                surface,
                swipe: SwipeTracker::new(),
                last_snapshot: None,
                ledger,
                identity: PlayerIdentity::new(1).with_name("You"),
                recorded: false,
            }
        }

        fn today(&self) -> NaiveDate {
            self.ledger.today()
        }

        /// Spend a life and start a fresh session
        fn new_game(&mut self) {
            let today = self.today();
            if let Err(e) = self.ledger.credit_lives(
                &self.identity,
                DAILY_GRANT,
                &format!("daily-{}", date_key(today)),
            ) {
                log::warn!("Daily grant failed: {e}");
            }
            match self.ledger.start_session(&self.identity, today) {
                Ok(ticket) => {
                    let seed = js_sys::Date::now() as u64;
                    self.session = GameSession::new(self.settings.game.clone(), seed);
                    self.session.start(now_ms());
                    self.recorded = false;
                    self.last_snapshot = None;
                    set_visible("game-over", false);
                    set_visible("out-of-lives", false);
                    set_text("hud-lives", &ticket.lives_remaining.to_string());
                    log::info!("New game with seed {seed}");
                }
                Err(LedgerError::InsufficientBalance { .. }) => {
                    set_visible("out-of-lives", true);
                }
                Err(e) => log::error!("Could not start a session: {e}"),
            }
        }

        fn steer(&mut self, dir: Direction) {
            self.session.queue_direction(dir, now_ms());
        }

        /// Enter / space / continue button
        fn confirm(&mut self) {
            match self.session.status() {
                SessionStatus::PausedTransition => {
                    self.session.acknowledge_transition(now_ms());
                }
                SessionStatus::Idle | SessionStatus::GameOver => self.new_game(),
                SessionStatus::Playing | SessionStatus::AwaitingInput => {}
            }
        }

        fn frame(&mut self, now: u64) {
            for event in self.session.advance(now) {
                log::debug!("{event:?}");
            }
            if !self.recorded
                && let Some(result) = self.session.result()
            {
                self.recorded = true;
                match self.ledger.record_session_result(
                    &self.identity,
                    result.score,
                    result.mode,
                    self.today(),
                ) {
                    Ok(_) => self.update_week(),
                    Err(e) => log::error!("Could not record result: {e}"),
                }
            }

            self.session.render(&mut self.surface, CELL_SIZE as f32);

            if let Some(snapshot) = self.session.snapshot_if_due(now, self.last_snapshot.as_ref()) {
                update_hud(&snapshot);
                self.last_snapshot = Some(snapshot);
            }
        }

        fn update_week(&self) {
            match self.ledger.profile_summary(self.identity.id, self.today()) {
                Ok(summary) => {
                    set_text("hud-today", &summary.today_score.to_string());
                    set_text("hud-week", &summary.week_total.to_string());
                    set_text("hud-lives", &summary.lives_balance.to_string());
                }
                Err(e) => log::warn!("Profile summary unavailable: {e}"),
            }
        }
    }

    fn update_hud(snapshot: &Snapshot) {
        set_text("hud-score", &snapshot.score.to_string());
        set_text("hud-mode", snapshot.phase.as_str());
        set_visible(
            "hard-mode-prompt",
            snapshot.status == SessionStatus::PausedTransition,
        );
        set_visible("steer-prompt", snapshot.status == SessionStatus::AwaitingInput);
        set_visible("game-over", snapshot.status == SessionStatus::GameOver);
        if snapshot.status == SessionStatus::GameOver {
            set_text("final-score", &snapshot.score.to_string());
        }
    }

    pub fn run() -> Result<(), JsValue> {
        console_error_panic_hook::set_once();
        let _ = console_log::init_with_level(log::Level::Info);

        log::info!("Snake Rush starting...");

        let document = document().ok_or("no document")?;
        let canvas: HtmlCanvasElement = document
            .get_element_by_id("canvas")
            .ok_or("no canvas")?
            .dyn_into()?;
        canvas.set_width(CANVAS_WIDTH);
        canvas.set_height(CANVAS_HEIGHT);
        let ctx = canvas
            .get_context("2d")?
            .ok_or("no 2d context")?
            .dyn_into::<web_sys::CanvasRenderingContext2d>()?;

        let settings = Settings::load();
        let game = Rc::new(RefCell::new(Game::new(settings, CanvasSurface::new(ctx))));
        game.borrow().update_week();

        setup_keyboard(game.clone());
        setup_touch(&canvas, game.clone());
        setup_buttons(game.clone());

        request_animation_frame(game);
        log::info!("Snake Rush running!");
        Ok(())
    }

    fn setup_keyboard(game: Rc<RefCell<Game>>) {
        let Some(document) = document() else {
            return;
        };
        let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
            let key = event.key();
            let mut g = game.borrow_mut();
            if let Some(dir) = direction_for_key(&key) {
                event.prevent_default();
                g.steer(dir);
            } else if key == "Enter" || key == " " {
                event.prevent_default();
                g.confirm();
            } else if key == "Escape" {
                g.session.quit();
            }
        });
        let _ = document.add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn touch_pos(event: &TouchEvent) -> Option<Vec2> {
        let touch = event.touches().get(0)?;
        Some(Vec2::new(touch.client_x() as f32, touch.client_y() as f32))
    }

    fn setup_touch(canvas: &HtmlCanvasElement, game: Rc<RefCell<Game>>) {
        // Touch start: remember where the gesture began
        {
            let game = game.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: TouchEvent| {
                event.prevent_default();
                if let Some(pos) = touch_pos(&event) {
                    game.borrow_mut().swipe.begin(pos);
                }
            });
            let _ = canvas
                .add_event_listener_with_callback("touchstart", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Touch move: one direction per gesture
        {
            let game = game.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: TouchEvent| {
                event.prevent_default();
                let Some(pos) = touch_pos(&event) else {
                    return;
                };
                let mut g = game.borrow_mut();
                if let Some(dir) = g.swipe.update(pos) {
                    g.steer(dir);
                }
            });
            let _ = canvas
                .add_event_listener_with_callback("touchmove", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        {
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: TouchEvent| {
                game.borrow_mut().swipe.cancel();
            });
            let _ = canvas
                .add_event_listener_with_callback("touchend", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn setup_buttons(game: Rc<RefCell<Game>>) {
        let Some(document) = document() else {
            return;
        };

        // On-screen d-pad
        for id in ["btn-up", "btn-down", "btn-left", "btn-right"] {
            let (Some(btn), Some(dir)) = (document.get_element_by_id(id), direction_for_button(id))
            else {
                continue;
            };
            let game = game.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                game.borrow_mut().steer(dir);
            });
            let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Continue into hard mode, start and restart share one action
        for id in ["continue-btn", "start-btn", "restart-btn"] {
            let Some(btn) = document.get_element_by_id(id) else {
                continue;
            };
            let game = game.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                game.borrow_mut().confirm();
            });
            let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn request_animation_frame(game: Rc<RefCell<Game>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::once(move |time: f64| {
            game_loop(game, time);
        });
        let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn game_loop(game: Rc<RefCell<Game>>, time: f64) {
        game.borrow_mut().frame(time.max(0.0) as u64);
        request_animation_frame(game);
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() -> Result<(), JsValue> {
    wasm_game::run()
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
mod headless {
    use std::error::Error;
    use std::path::{Path, PathBuf};

    use chrono::{Datelike, NaiveDate};
    use snake_rush::calendar::date_key;
    use snake_rush::persistence::{LedgerStore, MemoryStore, SqliteStore};
    use snake_rush::platform::native::{run_realtime, run_virtual};
    use snake_rush::session::SessionResult;
    use snake_rush::sim::{Direction, GameState};
    use snake_rush::{GameSession, Ledger, LedgerError, PlayerId, PlayerIdentity, Settings};

    use super::DAILY_GRANT;

    const PLAYERS: [(u64, &str); 3] = [(1, "Viper"), (2, "Mamba"), (3, "Cobra")];
    const MAX_TICKS: u64 = 5_000;

    /// Greedy steering: head for the food, never into the body or an obstacle
    pub fn autopilot(state: &GameState) -> Option<Direction> {
        let head = state.head();
        let safe = |dir: Direction| {
            let next = state.grid.step(head, dir);
            // The tail still counts as body on the tick it would move away
            !state.obstacles.contains(&next) && !state.snake.iter().skip(1).any(|p| *p == next)
        };
        let options = [
            Direction::Up,
            Direction::Down,
            Direction::Left,
            Direction::Right,
        ]
        .into_iter()
        .filter(|d| *d != state.heading.opposite() && safe(*d));

        let Some(food) = state.food else {
            return options.into_iter().next();
        };
        options.min_by_key(|d| {
            let next = state.grid.step(head, *d);
            (next.x - food.x).abs() + (next.y - food.y).abs()
        })
    }

    fn env_flag(name: &str) -> bool {
        std::env::var(name).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }

    fn env_u32(name: &str, default: u32) -> u32 {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    async fn play(settings: &Settings, seed: u64, realtime: bool) -> Option<SessionResult> {
        let mut session = GameSession::new(settings.game.clone(), seed);
        if realtime {
            run_realtime(&mut session, autopilot, MAX_TICKS).await
        } else {
            run_virtual(&mut session, autopilot, MAX_TICKS)
        }
    }

    async fn run_with<S: LedgerStore>(
        ledger: Ledger<S>,
        settings: &Settings,
    ) -> Result<(), Box<dyn Error>> {
        let today = ledger.today();
        let week = ledger.current_week();
        let sessions = env_u32("SNAKE_RUSH_SESSIONS", 2);
        let realtime = env_flag("SNAKE_RUSH_REALTIME");

        for (id, name) in PLAYERS {
            let identity = PlayerIdentity::new(id).with_name(name);
            ledger.credit_lives(&identity, DAILY_GRANT, &format!("daily-{}", date_key(today)))?;

            for round in 0..sessions {
                match ledger.start_session(&identity, today) {
                    Ok(_) => {}
                    Err(LedgerError::InsufficientBalance { .. }) => {
                        println!("{name} is out of lives");
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
                let seed = date_seed(today) * 1_000 + id * 100 + round as u64;
                let Some(result) = play(settings, seed, realtime).await else {
                    continue;
                };
                let record =
                    ledger.record_session_result(&identity, result.score, result.mode, today)?;
                println!(
                    "{name}: {} points in {} ticks ({}, {}){}",
                    result.score,
                    result.ticks,
                    result.mode.as_str(),
                    result.end_reason.as_str(),
                    if record.daily_best_updated { " new daily best" } else { "" }
                );
            }
        }

        println!("\nLeaderboard {week} (pool {})", ledger.reward_pool(week)?);
        for entry in ledger.leaderboard(week, 10)? {
            let s = &entry.standing;
            println!(
                "  #{} {:<8} {:>6}",
                s.rank,
                s.display_name.as_deref().unwrap_or("?"),
                s.score
            );
        }

        let (id, name) = PLAYERS[0];
        let summary = ledger.profile_summary(PlayerId(id), today)?;
        println!(
            "\n{name}: today {} / week {} / {} lives",
            summary.today_score, summary.week_total, summary.lives_balance
        );
        let streak = ledger
            .weekly_streak(PlayerId(id), today)?
            .iter()
            .map(|d| {
                let mark = if d.played { d.score.to_string() } else { "-".into() };
                if d.is_today {
                    format!("[{} {mark}]", d.day_name)
                } else {
                    format!("{} {mark}", d.day_name)
                }
            })
            .collect::<Vec<_>>()
            .join("  ");
        println!("{streak}");
        Ok(())
    }

    /// Same seeds for the same day, so reruns replay identically
    fn date_seed(date: NaiveDate) -> u64 {
        date.num_days_from_ce().max(0) as u64
    }

    pub async fn run() -> Result<(), Box<dyn Error>> {
        let settings_path = std::env::var("SNAKE_RUSH_SETTINGS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("snake_rush.json"));
        let mut settings = Settings::load(&settings_path);
        settings.apply_env_overrides();
        settings.validate()?;

        match std::env::var("SNAKE_RUSH_DB") {
            Ok(path) => {
                log::info!("Using ledger database {path}");
                let store = SqliteStore::open(Path::new(&path))?;
                run_with(Ledger::new(store, settings.economy.clone()), &settings).await
            }
            Err(_) => {
                log::info!("Using in-memory ledger");
                run_with(Ledger::new(MemoryStore::new(), settings.economy.clone()), &settings)
                    .await
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() {
    env_logger::init();
    log::info!("Snake Rush (headless) starting...");
    if let Err(e) = headless::run().await {
        log::error!("{e}");
        std::process::exit(1);
    }
}
