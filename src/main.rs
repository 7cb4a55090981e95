pub mod ui;

use catchdex::{
    challenge::{
        habitat_filter, habitats, tiers_in_habitat, Challenge, ChallengeError,
        ChallengeSequence, DifficultyTier, ANY_HABITAT,
    },
    clock::{Clock, SystemClock},
    config::{ConfigStore, FileConfigStore, TimingConfig},
    direction::Direction,
    engine::{EngineEvent, QteEngine},
    ledger::{AttemptSink, CapturedPokemon, CatchLedger, CatchResult, LedgerSummary},
    outcome::{CatchAttempt, Outcome},
    runtime::{CatchEvent, CrosstermEventSource, FixedTicker, Runner},
};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use itertools::Itertools;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::{self, File, OpenOptions},
    io::{self, stdin},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TICK_RATE_MS: u64 = 10;

/// catch wild pokemon by hitting arrow sequences against the clock
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal pokédex minigame: a wild pokemon appears, you get a short countdown, then every arrow of its sequence has to be hit before its timer bar runs dry. Captures are kept in a local ledger."
)]
pub struct Cli {
    /// difficulty tier of wild encounters (defaults to the saved config)
    #[clap(short = 'd', long, value_enum)]
    difficulty: Option<DifficultyTier>,

    /// only meet wild pokemon living in this habitat
    #[clap(long, value_name = "NAME", default_value = ANY_HABITAT)]
    habitat: String,

    /// list the habitats of wild pokemon and exit
    #[clap(long)]
    habitats: bool,

    /// load the challenge from a JSON file instead of meeting a wild pokemon
    #[clap(short = 'c', long, value_name = "PATH", conflicts_with = "sequence")]
    challenge: Option<PathBuf>,

    /// custom arrow sequence, e.g. up,down,left
    #[clap(short = 's', long)]
    sequence: Option<String>,

    /// seconds allowed per arrow of a custom sequence
    #[clap(short = 't', long, default_value_t = 1.0)]
    time_per_symbol: f64,

    /// print the captured pokemon and exit
    #[clap(long)]
    pokedex: bool,

    /// write the attempt history as CSV to PATH and exit
    #[clap(long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// delete every recorded attempt and capture, then exit
    #[clap(long)]
    clear: bool,

    /// persist the effective difficulty to the config file
    #[clap(long)]
    save_config: bool,

    /// write logs to PATH (filter with RUST_LOG)
    #[clap(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeSource {
    Wild {
        tier: DifficultyTier,
        habitat: Option<String>,
    },
    Fixed,
}

impl Cli {
    fn build_challenge(
        &self,
        difficulty: DifficultyTier,
    ) -> Result<(Challenge, ChallengeSource), Box<dyn Error>> {
        if let Some(path) = &self.challenge {
            let bytes = fs::read(path)?;
            return Ok((Challenge::from_json(&bytes)?, ChallengeSource::Fixed));
        }
        if let Some(list) = &self.sequence {
            let sequence = ChallengeSequence::parse(list, self.time_per_symbol)?;
            return Ok((Challenge::custom(sequence), ChallengeSource::Fixed));
        }
        let habitat = habitat_filter(&self.habitat);
        let challenge = Challenge::wild(difficulty, habitat.as_deref(), &mut rand::thread_rng())?;
        Ok((
            challenge,
            ChallengeSource::Wild {
                tier: difficulty,
                habitat,
            },
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Encounter,
    Catching,
    Results,
    Pokedex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Quit,
}

#[derive(Debug, Default)]
pub struct PokedexState {
    pub scroll_offset: usize,
    pub entries: Vec<CapturedPokemon>,
    pub summary: LedgerSummary,
}

pub struct App<C: Clock + Clone = SystemClock> {
    pub challenge: Challenge,
    pub source: ChallengeSource,
    pub timing: TimingConfig,
    pub engine: Option<QteEngine<C>>,
    pub state: AppState,
    pub outcome: Option<Outcome>,
    pub samples: Vec<Duration>,
    pub catch_result: Option<CatchResult>,
    pub notice: Option<String>,
    pub ledger: Option<CatchLedger>,
    pub pokedex_state: PokedexState,
    pokedex_return: AppState,
    clock: C,
}

impl<C: Clock + Clone> App<C> {
    pub fn new(
        challenge: Challenge,
        source: ChallengeSource,
        timing: TimingConfig,
        ledger: Option<CatchLedger>,
        clock: C,
    ) -> Self {
        Self {
            challenge,
            source,
            timing,
            engine: None,
            state: AppState::Encounter,
            outcome: None,
            samples: Vec::new(),
            catch_result: None,
            notice: None,
            ledger,
            pokedex_state: PokedexState::default(),
            pokedex_return: AppState::Encounter,
            clock,
        }
    }

    /// Throws the ball: a fresh session replaces whatever was running
    pub fn start_attempt(&mut self) {
        self.abort();
        self.outcome = None;
        self.samples.clear();
        self.catch_result = None;
        self.notice = None;
        self.engine = Some(QteEngine::new(
            self.challenge.sequence.clone(),
            self.timing,
            self.clock.clone(),
        ));
        self.state = AppState::Catching;
        info!(
            pokemon_id = self.challenge.pokemon_id,
            symbols = self.challenge.sequence.len(),
            "catch attempt started"
        );
    }

    pub fn new_encounter(&mut self) {
        self.abort();
        if let ChallengeSource::Wild { tier, habitat } = &self.source {
            match Challenge::wild(*tier, habitat.as_deref(), &mut rand::thread_rng()) {
                Ok(challenge) => self.challenge = challenge,
                Err(e) => self.notice = Some(e.to_string()),
            }
        }
        self.outcome = None;
        self.catch_result = None;
        self.state = AppState::Encounter;
    }

    /// Drops the running session without reporting anything
    pub fn abort(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.close();
        }
    }

    /// Leaving the app still records a game that already ended but is
    /// waiting out its result delay
    pub fn quit(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.settle(engine);
        }
    }

    /// Closes `engine`, reporting its outcome if it has one to hand back
    fn settle(&mut self, engine: QteEngine<C>) -> bool {
        let samples = engine.session().sample_durations.clone();
        match engine.close() {
            Some(outcome) => {
                self.samples = samples;
                self.report(outcome);
                true
            }
            None => false,
        }
    }

    /// Returns true while the screen needs redrawing on every tick
    pub fn on_tick(&mut self) -> bool {
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };
        let events = engine.poll();
        self.apply(events);
        self.state == AppState::Catching
    }

    pub fn on_direction(&mut self, dir: Direction) {
        if let Some(engine) = self.engine.as_mut() {
            let events = engine.press(dir);
            self.apply(events);
        }
    }

    fn apply(&mut self, events: Vec<EngineEvent>) {
        for event in events {
            if let EngineEvent::Completed(outcome) = event {
                if let Some(engine) = self.engine.take() {
                    self.samples = engine.session().sample_durations.clone();
                    engine.close();
                }
                self.report(outcome);
            }
        }
    }

    /// Escape from the catch dialog, refused while an arrow is on the clock
    pub fn close_catch(&mut self) {
        let Some(engine) = self.engine.take() else {
            self.state = AppState::Encounter;
            return;
        };
        if !engine.can_close() {
            self.engine = Some(engine);
            return;
        }
        if !self.settle(engine) {
            self.state = AppState::Encounter;
        }
    }

    fn report(&mut self, outcome: Outcome) {
        let attempt = CatchAttempt::new(self.challenge.pokemon_id, &outcome);
        match self.ledger.as_mut() {
            Some(ledger) => match ledger.submit(&attempt, &self.challenge.pokemon_name) {
                Ok(result) => self.catch_result = Some(result),
                Err(e) => self.notice = Some(format!("attempt not recorded: {e}")),
            },
            None => self.notice = Some("catch ledger unavailable, attempt not recorded".to_string()),
        }
        self.outcome = Some(outcome);
        self.state = AppState::Results;
    }

    pub fn open_pokedex(&mut self) {
        self.pokedex_state.scroll_offset = 0;
        match self.ledger.as_ref() {
            Some(ledger) => match (ledger.captured(), ledger.summary()) {
                (Ok(entries), Ok(summary)) => {
                    self.pokedex_state.entries = entries;
                    self.pokedex_state.summary = summary;
                }
                (Err(e), _) | (_, Err(e)) => self.notice = Some(format!("pokédex unavailable: {e}")),
            },
            None => self.notice = Some("catch ledger unavailable".to_string()),
        }
        self.pokedex_return = self.state;
        self.state = AppState::Pokedex;
    }

    pub fn already_captured(&self) -> bool {
        self.ledger
            .as_ref()
            .and_then(|l| l.is_captured(self.challenge.pokemon_id).ok())
            .unwrap_or(false)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Action::Quit;
        }

        match self.state {
            AppState::Encounter => match key.code {
                KeyCode::Enter | KeyCode::Char(' ') => self.start_attempt(),
                KeyCode::Char('n') => self.new_encounter(),
                KeyCode::Char('p') => self.open_pokedex(),
                KeyCode::Esc | KeyCode::Char('q') => return Action::Quit,
                _ => {}
            },
            AppState::Catching => {
                if let Some(dir) = Direction::from_key(key.code) {
                    self.on_direction(dir);
                } else if key.code == KeyCode::Esc {
                    self.close_catch();
                }
            }
            AppState::Results => match key.code {
                KeyCode::Char('r') => self.start_attempt(),
                KeyCode::Char('n') => self.new_encounter(),
                KeyCode::Char('p') => self.open_pokedex(),
                KeyCode::Esc => self.state = AppState::Encounter,
                KeyCode::Char('q') => return Action::Quit,
                _ => {}
            },
            AppState::Pokedex => match key.code {
                KeyCode::Up => {
                    self.pokedex_state.scroll_offset =
                        self.pokedex_state.scroll_offset.saturating_sub(1);
                }
                KeyCode::Down => {
                    // clamped when rendering
                    self.pokedex_state.scroll_offset += 1;
                }
                KeyCode::PageUp => {
                    self.pokedex_state.scroll_offset =
                        self.pokedex_state.scroll_offset.saturating_sub(10);
                }
                KeyCode::PageDown => {
                    self.pokedex_state.scroll_offset += 10;
                }
                KeyCode::Home => {
                    self.pokedex_state.scroll_offset = 0;
                }
                KeyCode::Char('b') | KeyCode::Backspace | KeyCode::Esc => {
                    self.state = self.pokedex_return;
                }
                KeyCode::Char('q') => return Action::Quit,
                _ => {}
            },
        }

        Action::Continue
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Some(path) = &cli.log_file {
        init_logging(path)?;
    }

    let store = FileConfigStore::new();
    let mut config = store.load();
    if let Some(difficulty) = cli.difficulty {
        config.difficulty = difficulty;
    }
    if cli.save_config {
        store.save(&config)?;
        info!(path = %store.path().display(), "config saved");
    }

    if cli.habitats {
        print_habitats();
        return Ok(());
    }

    if cli.pokedex || cli.export.is_some() || cli.clear {
        let ledger = CatchLedger::new()?;
        if let Some(path) = &cli.export {
            let rows = ledger.export_csv(File::create(path)?)?;
            println!("exported {rows} attempts to {}", path.display());
        }
        if cli.clear {
            ledger.clear_all()?;
            info!("catch ledger cleared");
            println!("catch ledger cleared");
        }
        if cli.pokedex {
            print_pokedex(&ledger)?;
        }
        return Ok(());
    }

    let (challenge, source) = match cli.build_challenge(config.difficulty) {
        Ok(built) => built,
        Err(e) => {
            let kind = if e.is::<ChallengeError>() || e.is::<serde_json::Error>() {
                ErrorKind::InvalidValue
            } else {
                ErrorKind::Io
            };
            Cli::command().error(kind, e.to_string()).exit()
        }
    };

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let ledger = CatchLedger::new()
        .inspect_err(|e| warn!(error = %e, "catch ledger unavailable"))
        .ok();

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(challenge, source, config.timing, ledger, SystemClock::new());
    let res = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    terminal.draw(|f| ui::draw(app, f))?;

    loop {
        match runner.step() {
            CatchEvent::Tick => {
                if app.on_tick() {
                    terminal.draw(|f| ui::draw(app, f))?;
                }
            }
            CatchEvent::Resize => {
                terminal.draw(|f| ui::draw(app, f))?;
            }
            CatchEvent::Key(key) => {
                if app.handle_key(key) == Action::Quit {
                    app.quit();
                    break;
                }
                terminal.draw(|f| ui::draw(app, f))?;
            }
        }
    }

    Ok(())
}

/// `RUST_LOG` when set and valid, info otherwise
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn init_logging(path: &Path) -> Result<(), Box<dyn Error>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn print_habitats() {
    for habitat in habitats() {
        println!(
            "{habitat:<12} {}",
            tiers_in_habitat(habitat).iter().join(", ")
        );
    }
}

fn print_pokedex(ledger: &CatchLedger) -> Result<(), Box<dyn Error>> {
    let entries = ledger.captured()?;
    let summary = ledger.summary()?;

    if entries.is_empty() {
        println!("no pokemon captured yet");
    } else {
        println!(
            "{}",
            entries
                .iter()
                .map(|p| format!(
                    "#{:03} {:<16} {} {}",
                    p.pokemon_id,
                    p.pokemon_name,
                    if p.perfect { "★" } else { " " },
                    p.caught_at.format("%Y-%m-%d %H:%M")
                ))
                .join("\n")
        );
    }
    println!(
        "{} captured · {} attempts · {:.0}% success · {} perfect",
        summary.captured,
        summary.attempts,
        summary.success_rate(),
        summary.perfects
    );
    Ok(())
}
