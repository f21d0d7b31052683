use crate::{
    error::Diagnostic, gc::Heap, lexer::Lexer, printer, reader::Reader, symbol::SymbolTable,
};

fn read_printed_sized(src: &str, heap_cells: usize) -> (Vec<String>, u64) {
    let tokens = Lexer::new(src, 0).lex().unwrap();
    let mut heap = Heap::new(heap_cells);
    let mut symbols = SymbolTable::new();
    let mut reader = Reader::new(&tokens, 0);

    let mut printed = Vec::new();

    while let Some(value) = reader.next_value(&mut heap, &mut symbols).unwrap() {
        printed.push(printer::to_string(&heap, &symbols, value));
    }

    (printed, heap.stats().collections)
}

fn read_printed(src: &str) -> Vec<String> {
    read_printed_sized(src, 1 << 12).0
}

fn read_error(src: &str) -> Diagnostic {
    let tokens = Lexer::new(src, 0).lex().unwrap();
    let mut heap = Heap::new(1 << 12);
    let mut symbols = SymbolTable::new();
    let mut reader = Reader::new(&tokens, 0);

    loop {
        match reader.next_value(&mut heap, &mut symbols) {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("Test failed: no error occured"),
            Err(diagnostic) => return diagnostic,
        }
    }
}

macro_rules! reader_test {
    {$name:ident, $src:expr, [$($printed:expr),*$(,)?]$(,)?} => {
        #[test]
        fn $name() {
            assert_eq!(read_printed($src), vec![$($printed.to_owned()),*]);
        }
    };
}

reader_test! {
    flat_list,
    "(+ 1 2)",
    ["(+ 1 2)"],
}

reader_test! {
    nested_lists,
    "(a (b c) ((d)) e)",
    ["(a (b c) ((d)) e)"],
}

reader_test! {
    several_top_level_forms,
    "1 (2 3) x",
    ["1", "(2 3)", "x"],
}

reader_test! {
    literals,
    "#t #f #\\z -7",
    ["#t", "#f", "#\\z", "-7"],
}

reader_test! {
    empty_list,
    "()",
    ["()"],
}

reader_test! {
    comments_are_skipped,
    "(1 ; two\n 3)",
    ["(1 3)"],
}

#[test]
fn unbalanced_close_is_reported() {
    let diagnostic = read_error("(a b))");
    assert!(format!("{diagnostic:?}").contains("LR0001"));
}

#[test]
fn unclosed_list_is_reported() {
    let diagnostic = read_error("(a (b c)");
    assert!(format!("{diagnostic:?}").contains("LR0002"));
}

#[test]
fn over_deep_nesting_is_reported() {
    let src = "(".repeat(1100);
    let diagnostic = read_error(&src);
    assert!(format!("{diagnostic:?}").contains("LR0003"));
}

#[test]
fn reading_survives_collections() {
    let form = format!(
        "({})",
        (0..30).map(|n| n.to_string()).collect::<Vec<_>>().join(" ")
    );
    let src = vec![form.clone(); 40].join(" ");

    let (printed, collections) = read_printed_sized(&src, 256);

    assert!(collections >= 1, "the heap was sized to force collections");
    assert_eq!(printed, vec![form; 40]);
}
