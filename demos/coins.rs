use clap::Parser;

use plp_rs::circuit::TargetKind;
use plp_rs::dot::DotConfig;
use plp_rs::engine::{Engine, EngineConfig};
use plp_rs::program::{Cell, Goal, Statement};
use plp_rs::query::{QueryOptions, QueryResult, QueryType};
use plp_rs::session::QuerySession;
use plp_rs::term::Term;
use plp_rs::theory::TheoryStore;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of coins.
    #[arg(value_name = "INT", default_value = "3")]
    n: usize,

    /// Probability of heads for every coin.
    #[clap(long, value_name = "FLOAT", default_value = "0.4")]
    p: f64,

    /// Query type: probability, mpe, minpe or sample.
    #[clap(long, value_name = "TAG", default_value = "probability")]
    query: String,

    /// Number of samples for the sample query.
    #[clap(long, value_name = "INT", default_value = "1000")]
    samples: usize,

    /// Seed for the sample query.
    #[clap(long, value_name = "INT")]
    seed: Option<u64>,

    /// Observe that the first coin did not land on tails.
    #[clap(long)]
    evidence: bool,

    /// Use propagation of evidence before sampling.
    #[clap(long)]
    propagate: bool,

    /// Order circuit variables by a depth-first walk from the queries.
    #[clap(long)]
    dfs: bool,

    /// Print the ground formula graph in DOT format.
    #[clap(long)]
    dot: bool,
}

fn coin(i: usize) -> Term {
    Term::compound("coin", [Term::int(i as i64)])
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    // Cell:
    //   coin(1). ... coin(n).
    //   p::heads(C); (1-p)::tails(C) :- coin(C).
    //   win :- heads(C).
    //   query(win). query(heads(C)).
    //   evidence(tails(1), false).
    let mut statements: Vec<Statement> = (1..=args.n).map(|i| Statement::fact(coin(i))).collect();
    statements.push(Statement::disjunction(
        [
            (args.p, Term::compound("heads", [Term::var("C")])),
            (1.0 - args.p, Term::compound("tails", [Term::var("C")])),
        ],
        Goal::call(Term::compound("coin", [Term::var("C")])),
    ));
    statements.push(Statement::clause(
        Term::atom("win"),
        Goal::call(Term::compound("heads", [Term::var("C")])),
    ));
    statements.push(Statement::Query(Term::atom("win")));
    statements.push(Statement::Query(Term::compound("heads", [Term::var("C")])));
    if args.evidence {
        statements.push(Statement::Evidence(Term::compound("tails", [Term::int(1)]), false));
    }
    let cell = Cell::split(statements);

    let mut store = TheoryStore::new();
    let range = store.replace("cell", cell.statements)?;
    println!("cell occupies statements {}..{}", range.start, range.end);

    let options = QueryOptions {
        target: if args.dfs { TargetKind::BddDfs } else { TargetKind::Bdd },
        samples: args.samples,
        propagate_evidence: args.propagate,
        seed: args.seed,
        cancel: None,
    };
    let query_type: QueryType = args.query.parse()?;

    let engine = Engine::with_config(EngineConfig::default().with_max_depth(64));
    let mut session = QuerySession::open(&store, engine);
    session.prepare(cell.queries, cell.evidence, query_type, &options)?;

    if args.dot {
        let config = DotConfig {
            include_scoped: true,
            ..DotConfig::default()
        };
        println!("{}", session.formula_cache().graph().to_dot_with_config(&config)?);
    }

    for result in session.evaluate_all()? {
        match result {
            QueryResult::Exact(r) => {
                for (term, evaluation) in &r.weights {
                    println!("{}: {:?}", term, evaluation);
                }
                println!("evidence: {:?}", r.evidence);
            }
            QueryResult::Sample(r) => {
                let total = r.samples.len();
                let wins = r.samples.iter().filter(|s| s.get(&Term::atom("win")) == Some(&true)).count();
                println!("win in {} of {} samples ({:.3})", wins, total, wins as f64 / total.max(1) as f64);
                println!("evidence: {:?}", r.evidence);
            }
            QueryResult::Failed(failure) => {
                println!("query failed: {}", failure);
            }
        }
    }

    println!("compilations: {}", session.formula_cache().compilations());
    let time_total = time_total.elapsed();
    println!("\nAll done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
