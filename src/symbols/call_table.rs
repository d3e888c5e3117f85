use crate::frontend::lexer::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub name: String,
    pub arity: usize,
    pub span: Span,
}

/// Every call seen while parsing, in source order.
#[derive(Debug, Default)]
pub struct CallTable {
    calls: Vec<CallSite>,
}

impl CallTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, arity: usize, span: Span) {
        self.calls.push(CallSite {
            name: name.to_string(),
            arity,
            span,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallSite> {
        self.calls.iter()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}
