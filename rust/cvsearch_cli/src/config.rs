use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use cvsearch::{
    Backend,
    CpuMethod,
    GpuMethod,
    SearchConfig,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::cli::ConfigArgs;
use crate::errors::CliError;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub search: SearchConfig,
}

/// One concrete way of running the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Cpu(CpuMethod),
    Gpu(GpuMethod),
}

impl Method {
    pub fn all() -> impl Iterator<Item = Method> {
        CpuMethod::ALL
            .into_iter()
            .map(Method::Cpu)
            .chain(GpuMethod::ALL.into_iter().map(Method::Gpu))
    }

    pub fn backend(&self) -> Backend {
        match self {
            Method::Cpu(_) => Backend::Cpu,
            Method::Gpu(_) => Backend::Gpu,
        }
    }

    pub fn apply(&self, search: SearchConfig) -> SearchConfig {
        match self {
            Method::Cpu(m) => search.with_cpu_method(*m),
            Method::Gpu(m) => search.with_gpu_method(*m),
        }
    }

    /// Method the config currently describes.
    pub fn of(config: &Config) -> Method {
        match config.backend {
            Backend::Cpu => Method::Cpu(
                CpuMethod::ALL
                    .into_iter()
                    .find(|m| {
                        m.strategy() == config.search.strategy()
                            && m.numeric() == config.search.numeric
                    })
                    .unwrap_or(CpuMethod::ALL[0]),
            ),
            Backend::Gpu => Method::Gpu(GpuMethod::from_strategy(config.search.strategy())),
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Cpu(m) => write!(f, "{}", m),
            Method::Gpu(m) => write!(f, "{}", m),
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(m) = CpuMethod::from_str(s) {
            return Ok(Method::Cpu(m));
        }
        GpuMethod::from_str(s)
            .map(Method::Gpu)
            .map_err(|_| format!("unknown method '{}'", s))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let file = std::fs::File::open(path).map_err(|e| CliError::io(e, path))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| CliError::ParseError { msg: e.to_string() })
    }

    /// Config file (or defaults) with the command line flags applied on top.
    pub fn from_args(args: &ConfigArgs) -> Result<Self, CliError> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(method) = &args.method {
            let method: Method = method
                .parse()
                .map_err(|source| CliError::Config { source })?;
            config.search = method.apply(config.search);
            config.backend = method.backend();
        }
        let search = &mut config.search;
        if let Some(top_n) = args.top_n {
            search.top_n = top_n;
        }
        if let Some(tolerance) = args.tolerance {
            search.tolerance = tolerance;
        }
        if let Some(cores) = args.cores {
            search.cores = cores;
        }
        if let Some(batch_size) = args.batch_size {
            search.batch_size = batch_size;
        }
        if let Some(verbose) = args.verbose {
            search.verbose = verbose;
        }
        if args.no_normalize {
            search.normalize = false;
        }
        if args.no_gaussian {
            search.use_gaussian = false;
        }

        search.validate().map_err(|e| CliError::Config {
            source: e.to_string(),
        })?;
        Ok(config)
    }
}
