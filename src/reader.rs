mod error;

#[cfg(test)]
mod test;

use copyspan::Span;

use crate::{
    error::{DResult, Diagnostic, PartialSpanned},
    gc::{Heap, Pending, PendingOverflow, ValueRef},
    lexer::Token,
    symbol::SymbolTable,
};

/// Assembles heap values from a token stream.
///
/// Every partially-built value sits on the heap's pending-value stack, so
/// the reader owns no references a collection could invalidate: literals
/// are allocated and pushed immediately, `(` pushes an open marker, and `)`
/// collapses the stack down to the nearest marker into a list. Safepoints
/// bracket list construction, the point where no unrooted intermediate
/// value exists.
pub struct Reader<'toks, 'src> {
    tokens: std::slice::Iter<'toks, PartialSpanned<Token<'src>>>,
    file_id: usize,
    /// Spans of the currently unmatched `(`s, for diagnostics.
    open_spans: Vec<Span>,
}

impl<'toks, 'src> Reader<'toks, 'src> {
    pub fn new(tokens: &'toks [PartialSpanned<Token<'src>>], file_id: usize) -> Self {
        Self {
            tokens: tokens.iter(),
            file_id,
            open_spans: Vec::new(),
        }
    }

    /// Reads the next top-level value, or `Ok(None)` at end of input.
    /// On a syntax error the pending stack is reset and the error is
    /// reported with the offending span.
    pub fn next_value(
        &mut self,
        heap: &mut Heap,
        symbols: &mut SymbolTable,
    ) -> DResult<Option<ValueRef>> {
        debug_assert!(self.open_spans.is_empty());

        loop {
            let Some(&PartialSpanned { data: token, span }) = self.tokens.next() else {
                return match self.open_spans.pop() {
                    None => Ok(None),
                    Some(open) => Err(self.reset(heap, error::unclosed_list(open, self.file_id))),
                };
            };

            match token {
                Token::Number(n) => {
                    let cell = heap.alloc_number(n);
                    self.push_value(heap, cell, span)?;
                }
                Token::Symbol(name) => {
                    let symbol = symbols.intern(name);
                    let cell = heap.alloc_atom(symbol);
                    self.push_value(heap, cell, span)?;
                }
                Token::Boolean(b) => {
                    let cell = heap.alloc_boolean(b);
                    self.push_value(heap, cell, span)?;
                }
                Token::Character(c) => {
                    let cell = heap.alloc_character(c);
                    self.push_value(heap, cell, span)?;
                }
                Token::LParen => {
                    if heap.pending_push(Pending::Open).is_err() {
                        return Err(self.reset(heap, error::too_deeply_nested(span, self.file_id)));
                    }

                    self.open_spans.push(span);
                }
                Token::RParen => {
                    if self.open_spans.pop().is_none() {
                        return Err(self.reset(heap, error::unbalanced_close(span, self.file_id)));
                    }

                    heap.safepoint();

                    // Collapse the stack into a list, building up from the
                    // tail. Everything still unconsumed stays rooted on
                    // the pending stack throughout.
                    let mut list = heap.alloc_nil();

                    loop {
                        match heap
                            .pending_pop()
                            .expect("the open marker is on the pending stack")
                        {
                            Pending::Open => break,
                            Pending::Value(value) => list = heap.alloc_pair(value, list),
                        }
                    }

                    self.push_value(heap, list, span)?;
                    heap.safepoint();
                }
            }

            if self.open_spans.is_empty() {
                let Some(Pending::Value(value)) = heap.pending_pop() else {
                    unreachable!("a completed top-level value is on the pending stack");
                };

                return Ok(Some(value));
            }
        }
    }

    fn push_value(&mut self, heap: &mut Heap, value: ValueRef, span: Span) -> DResult<()> {
        match heap.pending_push(Pending::Value(value)) {
            Ok(()) => Ok(()),
            Err(PendingOverflow) => {
                Err(self.reset(heap, error::too_deeply_nested(span, self.file_id)))
            }
        }
    }

    /// Abandons the current expression: clears the pending stack and the
    /// open-marker bookkeeping so the next `next_value` starts clean.
    fn reset(&mut self, heap: &mut Heap, diagnostic: Diagnostic) -> Diagnostic {
        heap.pending_clear();
        self.open_spans.clear();

        diagnostic
    }
}
