use indoc::indoc;

use crate::{
    eval::{eval_toplevel, install_primitives},
    gc::Heap,
    lexer::Lexer,
    machine, printer,
    reader::Reader,
    symbol::SymbolTable,
};

fn run_program_sized(src: &str, heap_cells: usize) -> (Vec<String>, u64) {
    let tokens = Lexer::new(src, 0).lex().unwrap();
    let mut heap = Heap::new(heap_cells);
    let mut symbols = SymbolTable::new();
    install_primitives(&mut heap, &mut symbols);

    let mut reader = Reader::new(&tokens, 0);
    let mut printed = Vec::new();

    while let Some(expr) = reader.next_value(&mut heap, &mut symbols).unwrap() {
        let result = machine::eval(&mut heap, &symbols, expr);
        printed.push(printer::to_string(&heap, &symbols, result));
    }

    (printed, heap.stats().collections)
}

fn run_one(src: &str) -> String {
    run_program_sized(src, 1 << 12)
        .0
        .pop()
        .expect("the program has at least one form")
}

macro_rules! machine_test {
    {$name:ident, $src:expr, $expected:expr$(,)?} => {
        #[test]
        fn $name() {
            assert_eq!(run_one($src), $expected);
        }
    };
}

machine_test! {self_evaluating_number, "42", "42"}
machine_test! {addition, "(+ 1 2 3)", "6"}
machine_test! {nested_arithmetic, "(* 2 (+ 3 4))", "14"}
machine_test! {quote_returns_text, "(quote (a b c))", "(a b c)"}
machine_test! {lambda_application, "((lambda (x) (* x x)) 7)", "49"}
machine_test! {zero_argument_application, "((lambda () 42))", "42"}
machine_test! {if_dispatch, "(if #f 1 2)", "2"}
machine_test! {begin_sequence, "(begin 1 2 3)", "3"}
machine_test! {arguments_apply_in_call_order, "(cons 1 2)", "(1 . 2)"}
machine_test! {unbound_variable, "nope", "#<error: variable not found>"}
machine_test! {applying_a_number_fails, "(1 2)", "#<error: cannot apply non-procedure>"}
machine_test! {set_bang_is_unsupported, "(set! x 1)", "#<error: set! is not supported>"}
machine_test! {
    wrong_closure_arity,
    "((lambda (x) x) 1 2)",
    "#<error: incorrect number of arguments>",
}
machine_test! {
    malformed_begin,
    "(begin)",
    "#<error: bad special form: begin>",
}

#[test]
fn define_persists_across_forms() {
    let (printed, _) = run_program_sized("(define x 5) (+ x 1)", 1 << 12);
    assert_eq!(printed, vec!["5", "6"]);
}

#[test]
fn define_does_not_leak_out_of_a_body() {
    // The sequence discipline restores the environment register between
    // body forms, so a define buried in a body extends nothing the rest
    // of the body can see; only top-level defines stick.
    let src = indoc! {"
        ((lambda () (define y 2) (+ y 1)))
        (define z 1)
        z
    "};

    let (printed, _) = run_program_sized(src, 1 << 12);
    assert_eq!(
        printed,
        vec!["#<error: variable not found>", "1", "1"]
    );
}

#[test]
fn machine_agrees_with_the_tree_evaluator() {
    let programs = [
        "42",
        "(+ 1 2 3)",
        "(* 2 (+ 3 4))",
        "(quote (a b c))",
        "((lambda (x) (* x x)) 7)",
        "((lambda (x) (+ x 1) (* x 2)) 10)",
        "((lambda () 42))",
        "(if #f 1 2)",
        "(if 0 1 2)",
        "(begin 1 2 3)",
        "(cons 1 2)",
        "(car (quote (10 20)))",
        "(symbol? (quote a))",
        "(1 2)",
        "nope",
        "(define x 21) (+ x x)",
    ];

    for src in programs {
        let tokens = Lexer::new(src, 0).lex().unwrap();

        let mut tree_heap = Heap::new(1 << 12);
        let mut tree_symbols = SymbolTable::new();
        install_primitives(&mut tree_heap, &mut tree_symbols);

        let mut machine_heap = Heap::new(1 << 12);
        let mut machine_symbols = SymbolTable::new();
        install_primitives(&mut machine_heap, &mut machine_symbols);

        let mut tree_reader = Reader::new(&tokens, 0);
        let mut machine_reader = Reader::new(&tokens, 0);

        loop {
            let tree_expr = tree_reader
                .next_value(&mut tree_heap, &mut tree_symbols)
                .unwrap();
            let machine_expr = machine_reader
                .next_value(&mut machine_heap, &mut machine_symbols)
                .unwrap();

            let (Some(tree_expr), Some(machine_expr)) = (tree_expr, machine_expr) else {
                break;
            };

            let tree_result = eval_toplevel(&mut tree_heap, &tree_symbols, tree_expr);
            let machine_result = machine::eval(&mut machine_heap, &machine_symbols, machine_expr);

            assert_eq!(
                printer::to_string(&tree_heap, &tree_symbols, tree_result),
                printer::to_string(&machine_heap, &machine_symbols, machine_result),
                "evaluators disagree on {src:?}"
            );
        }
    }
}

#[test]
fn machine_survives_collections() {
    let src = indoc! {"
        (define build (lambda (a b c) (cons a (cons b (cons c ())))))
        (build (+ 1 2) (* 3 4) (build 7 8 9))
        (build (+ 1 2) (* 3 4) (build 7 8 9))
        (build (+ 1 2) (* 3 4) (build 7 8 9))
        (build (+ 1 2) (* 3 4) (build 7 8 9))
    "};

    let (printed, collections) = run_program_sized(src, 192);

    assert!(collections >= 1, "the heap was sized to force collections");
    assert_eq!(printed.last().unwrap(), "(3 12 (7 8 9))");
}
