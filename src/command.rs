use std::path::PathBuf;

/// Path-search overrides given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathArgs {
    pub max_hops: Option<u32>,
    pub max_paths: Option<usize>,
    pub prefer_l2: bool,
    pub no_l3: bool,
    pub include_down: bool,
}

/// Reachability overrides given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachArgs {
    pub include_suppressed: bool,
    pub no_dependencies: bool,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Paths {
        snapshot: Option<PathBuf>,
        source: String,
        target: String,
        args: PathArgs,
    },
    Reach {
        snapshot: Option<PathBuf>,
        source: String,
        target: String,
        args: ReachArgs,
    },
    Watch {
        snapshot: Option<PathBuf>,
        source: String,
        target: String,
        args: ReachArgs,
        /// Stop after this many completed checks; runs until Ctrl+C otherwise
        ticks: Option<u32>,
    },
    Suppression {
        snapshot: Option<PathBuf>,
        device: Option<String>,
    },
    Export {
        snapshot: Option<PathBuf>,
    },
    Help,
    Version,
}
