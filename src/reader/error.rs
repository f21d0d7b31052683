use copyspan::Span;

use crate::error::{Diagnostic, FullSpan, error};

pub fn unbalanced_close(span: Span, file_id: usize) -> Diagnostic {
    error!("LR0001", "\")\" without a matching \"(\"", [{"here", FullSpan::new(span, file_id), primary}])
}

pub fn unclosed_list(open: Span, file_id: usize) -> Diagnostic {
    error!("LR0002", "Input ended inside a list", [{"this \"(\" is never closed", FullSpan::new(open, file_id), primary}])
}

pub fn too_deeply_nested(span: Span, file_id: usize) -> Diagnostic {
    error!("LR0003", "Expression nests too deeply for the reader", [{"while reading this", FullSpan::new(span, file_id), primary}])
}
