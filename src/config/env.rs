//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PARTEST";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// Degree of parallelism from PARTEST_DOP
    pub degree_of_parallelism: Option<usize>,
    /// Retry failed tests from PARTEST_RETEST
    pub retest_failures: Option<bool>,
    /// Config file from PARTEST_CONFIG
    pub config_file: Option<String>,
    /// Output format from PARTEST_FORMAT
    pub format: Option<String>,
    /// Verbose from PARTEST_VERBOSE
    pub verbose: Option<bool>,
    /// Disable output capture from PARTEST_NO_CAPTURE
    pub no_capture: Option<bool>,
    /// Results directory from PARTEST_RESULTS_DIR
    pub results_dir: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which receives full variable names
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}_{name}"));
        let get_parse = |name: &str| get(name).and_then(|v| v.trim().parse().ok());
        let get_bool = |name: &str| get(name).map(|v| parse_bool(&v));

        Self {
            degree_of_parallelism: get_parse("DOP"),
            retest_failures: get_bool("RETEST"),
            config_file: get("CONFIG"),
            format: get("FORMAT"),
            verbose: get_bool("VERBOSE"),
            no_capture: get_bool("NO_CAPTURE"),
            results_dir: get("RESULTS_DIR"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        *self != Self::default()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_DOP:          {:?}", ENV_PREFIX, self.degree_of_parallelism);
        println!("  {}_RETEST:       {:?}", ENV_PREFIX, self.retest_failures);
        println!("  {}_CONFIG:       {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_FORMAT:       {:?}", ENV_PREFIX, self.format);
        println!("  {}_VERBOSE:      {:?}", ENV_PREFIX, self.verbose);
        println!("  {}_NO_CAPTURE:   {:?}", ENV_PREFIX, self.no_capture);
        println!("  {}_RESULTS_DIR:  {:?}", ENV_PREFIX, self.results_dir);
    }
}

/// Interpret an environment value as a boolean
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}

/// Print all PARTEST environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_DOP          Degree of parallelism (0 selects the default of 4)");
    println!("  {ENV_PREFIX}_RETEST       Retry failed tests once (true/false)");
    println!("  {ENV_PREFIX}_CONFIG       Path to configuration file");
    println!("  {ENV_PREFIX}_FORMAT       Output format (table, tree, json, json-pretty, summary)");
    println!("  {ENV_PREFIX}_VERBOSE      Enable verbose output (true/false)");
    println!("  {ENV_PREFIX}_NO_CAPTURE   Stream test output instead of capturing it");
    println!("  {ENV_PREFIX}_RESULTS_DIR  Directory for saved run results");
    println!("  RUST_LOG             Log filter, overrides verbosity");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_DOP=8");
    println!("  export {ENV_PREFIX}_RETEST=true");
    println!("  partest run suite.yaml");
}
