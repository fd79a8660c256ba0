use backtrack::problems::{Permutations, Sudoku};
use backtrack::search::SearchStatistics;
use backtrack::{Engine, EngineConfig, EngineError, Problem, SearchReport};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// --- Command Line Arguments ---

#[derive(Parser)]
#[command(name = "backtrack")]
#[command(about = "backtrack - parallel backtracking search")]
#[command(version)]
#[command(subcommand_required = true)]
#[command(arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand
#[derive(ClapArgs, Clone, Copy, Debug)]
struct RunOptions {
    /// Number of worker threads (defaults to the number of CPUs)
    #[arg(long, short = 'j')]
    workers: Option<usize>,
    /// Poll the frontier with a short sleep instead of blocking on it
    #[arg(long)]
    polling: bool,
    /// Stop the search after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Print search statistics
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a Sudoku puzzle given as one character per cell (1-9, A-G; 0 or . for blanks)
    Sudoku {
        puzzle: String,
        /// Find every solution instead of stopping at the first
        #[arg(long)]
        all: bool,
        #[command(flatten)]
        options: RunOptions,
    },
    /// Enumerate ordered selections of k distinct values from 1..=n
    Permutations {
        #[arg(long)]
        n: u32,
        #[arg(long)]
        k: usize,
        /// Stop at the first selection found
        #[arg(long)]
        greedy: bool,
        #[command(flatten)]
        options: RunOptions,
    },
}

impl RunOptions {
    fn config(&self, greedy: bool) -> EngineConfig {
        let config = EngineConfig::default().with_greedy(greedy);
        if self.polling {
            config.with_polling(EngineConfig::DEFAULT_POLL_BACKOFF)
        } else {
            config
        }
    }

    fn workers(&self) -> usize {
        self.workers.unwrap_or_else(EngineConfig::default_workers)
    }
}

/// Run the engine until it drains or the timeout expires.
fn run<P: Problem>(
    problem: P,
    greedy: bool,
    options: &RunOptions,
) -> Result<(Vec<Vec<P::Choice>>, SearchReport), EngineError> {
    let mut engine = Engine::new(problem, options.config(greedy))?;
    engine.start(options.workers())?;

    let report = match options.timeout {
        Some(secs) => match engine.join_timeout(Duration::from_secs(secs))? {
            Some(report) => report,
            None => {
                eprintln!("Timed out after {secs}s, stopping search");
                engine.stop()?
            }
        },
        None => engine.join()?,
    };

    let solutions = engine
        .solutions()
        .drain()
        .into_iter()
        .map(|s| s.into_vec())
        .collect();
    Ok((solutions, report))
}

fn solve_sudoku(
    puzzle: &str,
    all: bool,
    options: &RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let sudoku = Sudoku::parse(puzzle)?;
    println!("Puzzle ({} empty cells):", sudoku.empty_cells());
    print!("{}", sudoku.render(&sudoku.fill(&[])));

    let (solutions, report) = run(sudoku.clone(), !all, options)?;

    if solutions.is_empty() {
        println!("\nNo solution found.");
    }
    for (i, solution) in solutions.iter().enumerate() {
        println!("\nSolution {}:", i + 1);
        print!("{}", sudoku.render(&sudoku.fill(solution)));
    }

    if options.verbose {
        print_search_statistics(&report.statistics);
    }
    Ok(())
}

fn enumerate_permutations(
    n: u32,
    k: usize,
    greedy: bool,
    options: &RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let problem = Permutations::new(n, k);
    let expected = problem.count();

    let (mut solutions, report) = run(problem, greedy, options)?;
    solutions.sort();

    for solution in &solutions {
        let values: Vec<String> = solution.iter().map(|v| v.to_string()).collect();
        println!("{}", values.join(" "));
    }
    match expected {
        Some(expected) if !greedy => {
            println!("Found {} of {} selections", solutions.len(), expected)
        }
        _ => println!("Found {} selection(s)", solutions.len()),
    }

    if options.verbose {
        print_search_statistics(&report.statistics);
    }
    Ok(())
}

/// Print search statistics
fn print_search_statistics(stats: &SearchStatistics) {
    println!("\nSearch Statistics:");
    for line in stats.format_summary().lines() {
        println!("  {line}");
    }
}

fn main() {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,backtrack=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Commands::Sudoku {
            puzzle,
            all,
            options,
        } => solve_sudoku(&puzzle, all, &options),
        Commands::Permutations {
            n,
            k,
            greedy,
            options,
        } => enumerate_permutations(n, k, greedy, &options),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
