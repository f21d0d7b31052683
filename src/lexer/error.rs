use crate::error::{Diagnostic, FullSpan, error};

pub fn unexpected_character(c: char, span: FullSpan) -> Diagnostic {
    error!("LL0001", format!("Unexpected character {c:?}"), [{"character here", span, primary}])
}

pub fn invalid_hash_sequence(c: char, span: FullSpan) -> Diagnostic {
    error!("LL0002", format!("Invalid literal \"#{c}\"; expected #t, #f or #\\<char>"), [{"here", span, primary}])
}

pub fn lone_hash(span: FullSpan) -> Diagnostic {
    error!("LL0003", "\"#\" at end of input", [{"here", span, primary}])
}

pub fn unterminated_character(span: FullSpan) -> Diagnostic {
    error!("LL0004", "Character literal is missing its character", [{"here", span, primary}])
}

pub fn number_out_of_range(text: &str, span: FullSpan) -> Diagnostic {
    error!("LL0005", format!("Numeric literal \"{text}\" does not fit a 64-bit integer"), [{"literal here", span, primary}])
}
