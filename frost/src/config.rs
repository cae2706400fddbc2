use {
    serde::{Deserialize, Serialize},
    std::{env, fmt, str::FromStr},
    thiserror::Error,
};

/// How the runtime keeps object storage in place.
///
/// This decides both whether [`Isolate::collect`] moves objects,
/// and how code that hands out pointers into object storage
/// must keep those pointers valid.
///
/// [`Isolate::collect`]: `super::Isolate::collect`
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy
{
    /// Reference counting; storage never moves.
    ///
    /// Holding a reference keeps a pointer into storage valid.
    #[default]
    RefCount,

    /// Moving collector that never moves pinned objects.
    ///
    /// Holding a pin keeps a pointer into storage valid.
    Pin,

    /// Moving collector whose clients must not rely on pins.
    ///
    /// Only a private copy of the storage stays valid.
    Copy,
}

impl Strategy
{
    /// Whether [`Isolate::collect`] relocates objects.
    ///
    /// [`Isolate::collect`]: `super::Isolate::collect`
    pub fn moves_objects(self) -> bool
    {
        !matches!(self, Self::RefCount)
    }

    /// The name used in configuration.
    pub fn name(self) -> &'static str
    {
        match self {
            Self::RefCount => "ref-count",
            Self::Pin      => "pin",
            Self::Copy     => "copy",
        }
    }
}

impl FromStr for Strategy
{
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err>
    {
        match name.trim().to_ascii_lowercase().as_str() {
            "ref-count" | "refcount" => Ok(Self::RefCount),
            "pin"                    => Ok(Self::Pin),
            "copy"                   => Ok(Self::Copy),
            _ => Err(ConfigError::Strategy(name.to_owned())),
        }
    }
}

impl fmt::Display for Strategy
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Configuration of an isolate.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config
{
    /// How object storage is kept in place.
    pub strategy: Strategy,

    /// Whether to run a collection before every allocation.
    ///
    /// This makes every allocation relocate all unpinned objects
    /// under a moving strategy, which flushes out code that
    /// holds pointers into storage without keeping it in place.
    pub collect_on_alloc: bool,
}

/// Error returned when loading configuration.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ConfigError
{
    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown memory strategy: {0:?}")]
    Strategy(String),

    #[error("Invalid value for {name}: {value:?}")]
    Var{name: &'static str, value: String},
}

impl Config
{
    /// Environment variable that selects the strategy.
    pub const STRATEGY_VAR: &'static str = "FROST_STRATEGY";

    /// Environment variable that enables collecting on allocation.
    pub const COLLECT_ON_ALLOC_VAR: &'static str = "FROST_COLLECT_ON_ALLOC";

    /// Parse configuration from JSON.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError>
    {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from the environment of the process.
    ///
    /// See [`from_vars`][`Self::from_vars`] for the variables consulted.
    pub fn from_env() -> Result<Self, ConfigError>
    {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration from variables.
    ///
    /// [`STRATEGY_VAR`] names a [`Strategy`],
    /// and [`COLLECT_ON_ALLOC_VAR`] is a Boolean
    /// (`1`, `true`, `0`, or `false`).
    /// Unset variables take their default values.
    ///
    /// [`STRATEGY_VAR`]: `Self::STRATEGY_VAR`
    /// [`COLLECT_ON_ALLOC_VAR`]: `Self::COLLECT_ON_ALLOC_VAR`
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let mut config = Self::default();

        if let Some(strategy) = var(Self::STRATEGY_VAR) {
            config.strategy = strategy.parse()?;
        }

        if let Some(value) = var(Self::COLLECT_ON_ALLOC_VAR) {
            config.collect_on_alloc = match value.trim() {
                "1" | "true"  => true,
                "0" | "false" => false,
                _ => return Err(ConfigError::Var{
                    name: Self::COLLECT_ON_ALLOC_VAR,
                    value,
                }),
            };
        }

        Ok(config)
    }
}
