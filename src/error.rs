mod sourcedb;
mod spanned;

use std::fmt::Debug;

use codespan_reporting::diagnostic::{
    Diagnostic as CodespanDiagnostic, Label, LabelStyle, Severity,
};
use codespan_reporting::term::{
    self,
    termcolor::{ColorChoice, StandardStream},
};

pub use sourcedb::SourceDB;
pub use spanned::*;

pub type DResult<T> = Result<T, Diagnostic>;

// `Box` keeps `Result<T, Diagnostic>` a single word wide on the Ok path.
#[derive(Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct Diagnostic(Box<RawDiagnostic>);

impl Debug for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostic")
            .field("severity", &self.0.severity)
            .field("code", &self.0.code)
            .field("message", &self.0.message)
            .field("hints", &self.0.hints)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hint {
    message: String,
    span: FullSpan,
    style: LabelStyle,
}

impl Hint {
    pub fn primary(message: String, span: FullSpan) -> Self {
        Self {
            message,
            span,
            style: LabelStyle::Primary,
        }
    }

    pub fn secondary(message: String, span: FullSpan) -> Self {
        Self {
            message,
            span,
            style: LabelStyle::Secondary,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
struct RawDiagnostic {
    severity: Severity,
    code: &'static str,
    message: String,
    hints: Vec<Hint>,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>, hints: Vec<Hint>) -> Self {
        Self(Box::new(RawDiagnostic {
            severity: Severity::Error,
            code,
            message: message.into(),
            hints,
        }))
    }

    /// Renders the diagnostic to stderr against the sources in `db`.
    pub fn emit(&self, db: &SourceDB) {
        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();

        let _ = term::emit(
            &mut writer.lock(),
            &config,
            db,
            &CodespanDiagnostic::from(self.clone()),
        );
    }
}

impl From<Hint> for Label<usize> {
    fn from(value: Hint) -> Self {
        Label {
            style: value.style,
            file_id: value.span.file_id,
            range: value.span.span.range(),
            message: value.message,
        }
    }
}

impl From<Diagnostic> for CodespanDiagnostic<usize> {
    fn from(value: Diagnostic) -> Self {
        let value: RawDiagnostic = *value.0;

        CodespanDiagnostic {
            severity: value.severity,
            code: Some(value.code.to_owned()),
            message: value.message,
            labels: value.hints.into_iter().map(Label::from).collect(),
            notes: Vec::new(),
        }
    }
}

/// Unwraps a [`DResult`], rendering the diagnostic and exiting on `Err`.
pub fn dresult_unwrap<T>(result: DResult<T>, db: &SourceDB) -> T {
    match result {
        Ok(value) => value,
        Err(diagnostic) => {
            diagnostic.emit(db);
            std::process::exit(1);
        }
    }
}

macro_rules! error {
    (
        $code:literal,
        $msg:expr,
        [
            $(
                {$hintmsg:expr, $span:expr, $type:ident}
            ),*$(,)?
        ]$(,)?
    ) => {
        $crate::error::Diagnostic::error(
            $code,
            $msg,
            vec![$(
                $crate::error::Hint::$type(String::from($hintmsg), $span)
            ),*]
        )
    };
}

pub(crate) use error;
