use std::io::Read as _;
use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, ValueEnum};
use log::debug;

use loam::{
    dresult_unwrap,
    error::SourceDB,
    eval,
    gc::Heap,
    lexer::Lexer,
    machine, printer,
    reader::Reader,
    symbol::SymbolTable,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Evaluator {
    /// Recursive tree walker.
    Tree,
    /// Explicit-control register machine.
    Machine,
}

/// A small Lisp with a semi-space copying garbage collector.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Source file; reads stdin when omitted.
    file: Option<PathBuf>,

    /// Heap capacity in cells, per space.
    #[arg(long, default_value_t = 1 << 16)]
    heap_size: usize,

    /// Which evaluator runs the top-level forms.
    #[arg(long, value_enum, default_value = "tree")]
    evaluator: Evaluator,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let (name, source) = match &args.file {
        Some(path) => {
            let source = std::fs::read_to_string(path).unwrap_or_else(|err| {
                eprintln!("{}: {err}", path.display());
                exit(1);
            });

            (path.display().to_string(), source)
        }
        None => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .unwrap_or_else(|err| {
                    eprintln!("stdin: {err}");
                    exit(1);
                });

            ("<stdin>".to_owned(), source)
        }
    };

    let mut db = SourceDB::new();
    let file_id = db.add(name, source.clone());

    let tokens = dresult_unwrap(Lexer::new(&source, file_id).lex(), &db);

    let mut heap = Heap::new(args.heap_size);
    let mut symbols = SymbolTable::new();
    eval::install_primitives(&mut heap, &mut symbols);

    let mut reader = Reader::new(&tokens, file_id);

    while let Some(expr) = dresult_unwrap(reader.next_value(&mut heap, &mut symbols), &db) {
        let result = match args.evaluator {
            Evaluator::Tree => eval::eval_toplevel(&mut heap, &symbols, expr),
            Evaluator::Machine => machine::eval(&mut heap, &symbols, expr),
        };

        println!("{}", printer::to_string(&heap, &symbols, result));
    }

    let stats = heap.stats();
    debug!(
        "exiting: {} collections, {} bytes retained on average, {} bytes allocated in total",
        stats.collections, stats.avg_retained_bytes, stats.total_allocated_bytes
    );
}
