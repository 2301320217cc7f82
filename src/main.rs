// retrace: backtracking grammar interpreter with a stepping debugger

use std::fs;
use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use retrace::compiler::compile_source;
use retrace::interpreter::diagnostics::{render_analysis_error, render_frontend_error};
use retrace::interpreter::{Analyzer, AnalyzerConfig, MatchResult, ResultValue, RunStatus};
use retrace::ui::App;

const EXIT_NO_MATCH: u8 = 1;
const EXIT_PROGRAM_ERROR: u8 = 2;
const EXIT_TIMEOUT: u8 = 3;
const EXIT_USAGE: u8 = 64;
const EXIT_INTERNAL: u8 = 70;

struct Options {
    file: String,
    input: String,
    entry: Option<String>,
    timeout: Option<Duration>,
    json: bool,
    tui: bool,
}

fn usage(program_name: &str) {
    eprintln!(
        "Usage: {} <file> [--input TEXT | --input-file PATH] [--entry NAME] [--timeout MS] [--json] [--tui]",
        program_name
    );
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} grammar.rt --input \"1+2\"          # Match and print the result", program_name);
    eprintln!("  {} grammar.rt --input-file in.txt --json", program_name);
    eprintln!("  {} grammar.rt --input \"1+2\" --tui    # Step through the run", program_name);
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut file = None;
    let mut input = None;
    let mut entry = None;
    let mut timeout = None;
    let mut json = false;
    let mut tui = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} expects a value", flag))
        };
        match arg.as_str() {
            "--input" => input = Some(value("--input")?),
            "--input-file" => {
                let path = value("--input-file")?;
                let text = fs::read_to_string(&path)
                    .map_err(|e| format!("Cannot read input file '{}': {}", path, e))?;
                input = Some(text);
            }
            "--entry" => entry = Some(value("--entry")?),
            "--timeout" => {
                let ms = value("--timeout")?;
                let ms: u64 = ms
                    .parse()
                    .map_err(|_| format!("--timeout expects milliseconds, got '{}'", ms))?;
                timeout = Some(Duration::from_millis(ms));
            }
            "--json" => json = true,
            "--tui" => tui = true,
            flag if flag.starts_with("--") => return Err(format!("Unknown option '{}'", flag)),
            path if file.is_none() => file = Some(path.to_string()),
            extra => return Err(format!("Unexpected argument '{}'", extra)),
        }
    }

    Ok(Options {
        file: file.ok_or_else(|| "No input file provided".to_string())?,
        input: input.unwrap_or_default(),
        entry,
        timeout,
        json,
        tui,
    })
}

/// Log filter from `RETRACE_LOG`, falling back to `RUST_LOG`; silent otherwise
fn init_tracing() {
    let filter = std::env::var("RETRACE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok());

    if let Some(filter) = filter {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .init();
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let program_name = args.first().map(|s| s.as_str()).unwrap_or("retrace");

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("Error: {}", message);
            eprintln!();
            usage(program_name);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if !Path::new(&options.file).exists() {
        eprintln!("Error: File '{}' not found", options.file);
        return ExitCode::from(EXIT_USAGE);
    }

    init_tracing();

    match run(&options) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}

fn run(options: &Options) -> io::Result<ExitCode> {
    let source = fs::read_to_string(&options.file)?;

    let program = match compile_source(&source) {
        Ok(program) => program,
        Err(err) => {
            eprint!("{}", render_frontend_error(&options.file, &source, &err));
            return Ok(ExitCode::from(EXIT_PROGRAM_ERROR));
        }
    };

    let config = AnalyzerConfig {
        trace_steps: tracing::enabled!(tracing::Level::TRACE),
        ..AnalyzerConfig::default()
    };
    let mut analyzer = Analyzer::new(program, config);
    if let Some(entry) = &options.entry {
        analyzer.set_entry_point(entry.clone());
    }

    if options.tui {
        analyzer.prepare(&options.input);
        return run_tui(analyzer, source);
    }

    let outcome = analyzer.start(&options.input, options.timeout);
    let result = match (&outcome, analyzer.get_result()) {
        (Ok(true), Some(result)) => result.clone(),
        _ => MatchResult {
            matched: false,
            length: 0,
            value: ResultValue::Nil,
            output: analyzer.output().to_string(),
        },
    };

    if let Err(err) = &outcome {
        eprint!("{}", render_analysis_error(&options.file, &source, err));
        let code = if err.is_internal() {
            EXIT_INTERNAL
        } else {
            EXIT_PROGRAM_ERROR
        };
        return Ok(ExitCode::from(code));
    }

    if options.json {
        let json = serde_json::to_string_pretty(&result).map_err(io::Error::other)?;
        println!("{}", json);
    } else {
        print!("{}", result.output);
        if result.matched {
            println!("matched {} char(s): {}", result.length, result.value);
        } else if analyzer.status() == RunStatus::TimedOut {
            eprintln!("timed out after {} step(s)", analyzer.steps());
        } else {
            println!("no match");
        }
    }

    Ok(ExitCode::from(match analyzer.status() {
        RunStatus::Matched => 0,
        RunStatus::TimedOut => EXIT_TIMEOUT,
        _ => EXIT_NO_MATCH,
    }))
}

fn run_tui(analyzer: Analyzer, source: String) -> io::Result<ExitCode> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(analyzer, source);
    let res = app.run(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res?;

    Ok(ExitCode::from(match app.analyzer.status() {
        RunStatus::Matched | RunStatus::Running | RunStatus::Ready => 0,
        RunStatus::NoMatch => EXIT_NO_MATCH,
        RunStatus::Errored => EXIT_PROGRAM_ERROR,
        RunStatus::TimedOut => EXIT_TIMEOUT,
        RunStatus::Faulted => EXIT_INTERNAL,
    }))
}
