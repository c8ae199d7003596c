use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEventKind, KeyModifiers},
    execute, queue,
    style::Print,
    terminal::{self, disable_raw_mode, enable_raw_mode, ClearType},
    tty::IsTty,
};
use std::{
    error::Error,
    fs,
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tracing_subscriber::EnvFilter;
use typing_engine::{
    config::{Config, ConfigStore, FileConfigStore},
    history::ResultLog,
    metrics::Metrics,
    progress::ProgressStore,
    runtime::{CrosstermEventSource, FixedTicker, Runner, SessionEvent},
    store::SqliteStore,
    Key, LessonContent, SessionController, SessionState, TypingEngine,
};

const TICK_RATE_MS: u64 = 16;

/// typing-session engine: practice lessons, resume progress, review results
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    /// progress database to use instead of the configured one
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// config file to use instead of the default location
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// log debug output to stderr
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// type a lesson interactively, resuming saved progress
    Practice {
        /// lesson identifier progress is saved under
        #[clap(short, long)]
        lesson: String,

        #[clap(flatten)]
        source: TextSource,
    },
    /// show saved progress for a lesson
    Progress {
        lesson: String,

        #[clap(flatten)]
        source: TextSource,
    },
    /// forget saved progress for a lesson
    Reset { lesson: String },
    /// list completed sessions
    History,
}

#[derive(Args, Debug)]
struct TextSource {
    /// lesson text
    #[clap(short, long, conflicts_with = "file")]
    text: Option<String>,

    /// read lesson text from a file
    #[clap(short, long)]
    file: Option<PathBuf>,
}

impl TextSource {
    fn read(&self) -> io::Result<Option<String>> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(Some(text.clone())),
            (None, Some(path)) => {
                let text = fs::read_to_string(path)?;
                // Editors leave a trailing newline nobody means to type
                Ok(Some(text.strip_suffix('\n').unwrap_or(&text).to_string()))
            }
            (None, None) => Ok(None),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_store = cli
        .config
        .as_ref()
        .map(FileConfigStore::with_path)
        .unwrap_or_default();
    let mut config = config_store.load();
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }

    match cli.command {
        Command::Practice { lesson, source } => {
            let Some(text) = source.read()? else {
                return Err("practice needs --text or --file".into());
            };
            practice(&config, LessonContent::new(lesson, text))
        }
        Command::Progress { lesson, source } => show_progress(&config, &lesson, source.read()?),
        Command::Reset { lesson } => {
            progress_store(&config)?.clear(&lesson);
            println!("cleared progress for {lesson}");
            Ok(())
        }
        Command::History => show_history(&config),
    }
}

fn progress_store(config: &Config) -> Result<ProgressStore, Box<dyn Error>> {
    let store = SqliteStore::open(config.resolved_db_path())?;
    Ok(ProgressStore::new(Arc::new(store), config.save_debounce()))
}

fn show_progress(
    config: &Config,
    lesson: &str,
    text: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let progress = progress_store(config)?;
    let Some(snapshot) = progress.load(lesson) else {
        println!("no saved progress for {lesson}");
        return Ok(());
    };

    // With the text at hand the snapshot is applied (and clamped) like a
    // real resume; without it the stored counters are shown as-is.
    let mut engine = TypingEngine::default();
    let content_len = text.map(|text| {
        engine.load_lesson(&LessonContent::new(lesson, text));
        engine.apply_snapshot(&snapshot);
        engine.content_len()
    });
    let state = if engine.is_loaded() {
        engine.state().clone()
    } else {
        SessionState {
            cursor: snapshot.cursor,
            correct_count: snapshot.correct_count,
            incorrect_count: snapshot.incorrect_count,
            backspace_count: snapshot.backspace_count,
            elapsed_active_ms: snapshot.elapsed_active_ms,
            mistake_frequency: snapshot.mistake_frequency.clone(),
            ..Default::default()
        }
    };
    let metrics = Metrics::from_state(&state, content_len.unwrap_or(0), config.top_mistakes);

    println!("lesson:     {lesson}");
    println!("status:     {}", state.status());
    match content_len {
        Some(len) => println!("position:   {}/{}", state.cursor, len),
        None => println!("position:   {}", state.cursor),
    }
    println!("elapsed:    {:.1}s", state.elapsed_active_ms as f64 / 1000.0);
    println!("backspaces: {}", state.backspace_count);
    print_metrics(&metrics, content_len.is_some());
    if let Some(updated) = snapshot.updated_at {
        println!("saved at:   {}", updated.to_rfc3339());
    }
    Ok(())
}

fn print_metrics(metrics: &Metrics, with_progress: bool) {
    if with_progress {
        println!("progress:   {:.0}%", metrics.progress);
    }
    println!("wpm:        {:.1}", metrics.wpm);
    println!("accuracy:   {:.1}%", metrics.accuracy);
    println!("error rate: {:.1}%", metrics.error_rate);
    if !metrics.top_mistakes.is_empty() {
        let mistakes: Vec<String> = metrics
            .top_mistakes
            .iter()
            .map(|(label, count)| format!("{label} ({count})"))
            .collect();
        println!("mistakes:   {}", mistakes.join(", "));
    }
}

fn show_history(config: &Config) -> Result<(), Box<dyn Error>> {
    let log = ResultLog::with_path(config.resolved_history_path());
    let results = log.read_all()?;
    if results.is_empty() {
        println!("no sessions recorded");
        return Ok(());
    }

    println!("{:<25} {:<20} {:>7} {:>8} {:>9}", "date", "lesson", "wpm", "acc", "elapsed");
    for r in results {
        println!(
            "{:<25} {:<20} {:>7.1} {:>7.1}% {:>8.1}s",
            r.date.format("%Y-%m-%d %H:%M:%S"),
            r.lesson_id,
            r.wpm,
            r.accuracy,
            r.elapsed_ms as f64 / 1000.0
        );
    }
    Ok(())
}

fn practice(config: &Config, lesson: LessonContent) -> Result<(), Box<dyn Error>> {
    if !io::stdin().is_tty() {
        return Err("practice needs an interactive terminal".into());
    }

    let mut controller = SessionController::new(TypingEngine::default(), progress_store(config)?)
        .with_top_mistakes(config.top_mistakes);
    if config.record_history {
        controller = controller.with_history(ResultLog::with_path(config.resolved_history_path()));
    }
    if controller.open(&lesson) {
        println!("resuming {} at {:.0}%", lesson.id, controller.metrics().progress);
    }

    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnableFocusChange)?;

    let res = run_practice(&mut controller, &mut stdout);

    execute!(stdout, DisableFocusChange)?;
    disable_raw_mode()?;
    controller.blur();
    controller.flush();

    res?;
    println!();
    print_metrics(&controller.metrics(), true);
    Ok(())
}

fn run_practice<W: Write>(controller: &mut SessionController, out: &mut W) -> io::Result<()> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    draw_status(controller, out)?;
    loop {
        match runner.step() {
            SessionEvent::Tick => controller.tick_now(),
            SessionEvent::FocusLost => controller.blur(),
            SessionEvent::FocusGained | SessionEvent::Resize => {}
            SessionEvent::Key(key) => {
                if key.kind == KeyEventKind::Release {
                    controller.release();
                    continue;
                }
                match key.code {
                    KeyCode::Esc => break,
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
                    KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        controller.retry()
                    }
                    _ => {
                        if let Some(k) = Key::from_key_event(&key) {
                            controller.press(k);
                        }
                    }
                }
            }
        }

        draw_status(controller, out)?;
        if controller.engine().state().completed {
            break;
        }
    }
    Ok(())
}

fn draw_status<W: Write>(controller: &SessionController, out: &mut W) -> io::Result<()> {
    let engine = controller.engine();
    let state = engine.state();
    let metrics = controller.metrics();
    let next = if state.next_expected_key.is_empty() {
        "done".to_string()
    } else {
        state.next_expected_key.clone()
    };

    queue!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(format!(
            "[{}] {}/{}  {:>5.1} wpm  {:>5.1}%  next: {}",
            state.status(),
            state.cursor,
            engine.content_len(),
            metrics.wpm,
            metrics.accuracy,
            next
        ))
    )?;
    out.flush()
}
