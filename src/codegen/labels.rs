/// Control structures that own labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Construct {
    If,
    While,
    For,
}

impl Construct {
    fn keyword(self) -> &'static str {
        match self {
            Construct::If => "if",
            Construct::While => "while",
            Construct::For => "for",
        }
    }

    fn slot(self) -> usize {
        match self {
            Construct::If => 0,
            Construct::While => 1,
            Construct::For => 2,
        }
    }
}

/// Names the labels of one construct instance:
/// `<function>.<keyword>_<path>[.<branch>]_<suffix>`, where `path` is the
/// construct's counter at each nesting depth joined with dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelBase {
    function: String,
    keyword: &'static str,
    path: String,
}

impl LabelBase {
    fn label(&self, suffix: &str) -> String {
        format!("{}.{}_{}_{}", self.function, self.keyword, self.path, suffix)
    }

    pub fn start(&self) -> String {
        self.label("start")
    }

    pub fn end(&self) -> String {
        self.label("end")
    }

    pub fn skip(&self) -> String {
        self.label("skip")
    }

    /// Skip label of the `index`-th `else if` of a chain.
    pub fn branch_skip(&self, index: usize) -> String {
        format!("{}.elseif_{}.{}_skip", self.function, self.path, index)
    }
}

/// Per-function label counters, one vector per construct kind indexed by
/// nesting depth.
#[derive(Debug)]
pub struct LabelAllocator {
    function: String,
    ids: [Vec<usize>; 3],
}

impl LabelAllocator {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            ids: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    /// Names a construct opened at `depth` open constructs.
    pub fn open(&mut self, construct: Construct, depth: usize) -> LabelBase {
        let ids = &mut self.ids[construct.slot()];
        if ids.len() <= depth {
            ids.resize(depth + 1, 0);
        }
        let path = ids[..=depth]
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".");
        LabelBase {
            function: self.function.clone(),
            keyword: construct.keyword(),
            path,
        }
    }

    /// Advances the counter once the construct at `depth` is complete.
    pub fn close(&mut self, construct: Construct, depth: usize) {
        if let Some(n) = self.ids[construct.slot()].get_mut(depth) {
            *n += 1;
        }
    }
}
