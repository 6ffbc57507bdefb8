use bitflags::bitflags;

bitflags! {
    /// Option bits accepted by the search driver.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SearchFlags: u32 {
        const IGNORECASE        = 1 << 0;
        const LITERAL           = 1 << 1;
        const BRUTEFORCE        = 1 << 2;
        const VISUALSTUDIO      = 1 << 3;
        const COLUMNNUMBER      = 1 << 4;
        const HIGHLIGHT         = 1 << 5;
        const HIGHLIGHT_MATCHES = 1 << 6;
        const SUMMARY           = 1 << 7;
    }
}

/// How the file-path filter should interpret its query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// `fn` — regex over file names only.
    #[default]
    Name,
    /// `fp` — regex over full paths.
    Path,
    /// `fs` — Visual-Assist whitespace-delimited fragment matching.
    VisualAssist,
    /// `ff` — fuzzy subsequence ranking.
    Fuzzy,
}

/// Fully resolved query options, assembled by the CLI layer (or any other
/// caller) and consumed by `search::driver` / `filter`.
#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    pub flags: SearchFlags,
    /// `L<n>` — 0 means unlimited.
    pub line_limit: u32,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub filter_mode: FilterMode,
}

impl QueryOptions {
    pub fn is_limit_unbounded(&self) -> bool {
        self.line_limit == 0
    }
}
