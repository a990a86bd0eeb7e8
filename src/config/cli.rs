use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the edgepurge binary.
#[derive(Debug, Parser)]
#[command(
    name = "edgepurge",
    version,
    about = "Purge CDN caches by surrogate key and manage service VCL"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "EDGEPURGE_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// API token. Read from the environment only; hidden from help output.
    #[arg(
        long = "api-token",
        env = "EDGEPURGE_API_TOKEN",
        hide = true,
        hide_env_values = true,
        global = true
    )]
    pub api_token: Option<String>,

    /// Override the CDN service id.
    #[arg(
        long = "service-id",
        env = "EDGEPURGE_SERVICE_ID",
        value_name = "ID",
        global = true
    )]
    pub service_id: Option<String>,

    /// Override the purge method (instant|soft).
    #[arg(
        long = "purge-method",
        env = "EDGEPURGE_PURGE_METHOD",
        value_name = "METHOD",
        global = true
    )]
    pub purge_method: Option<String>,

    /// Override the surrogate key length.
    #[arg(
        long = "hash-length",
        env = "EDGEPURGE_HASH_LENGTH",
        value_name = "CHARS",
        global = true
    )]
    pub hash_length: Option<usize>,

    /// Override the site id used to namespace cache tags.
    #[arg(
        long = "site-id",
        env = "EDGEPURGE_SITE_ID",
        value_name = "ID",
        global = true
    )]
    pub site_id: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Purge cached content.
    Purge(PurgeArgs),
    /// Invalidate cache tags, honouring the extension and own-config tags.
    Invalidate(TagsArgs),
    /// Print the Surrogate-Key header value for a set of cache tags.
    Keys(TagsArgs),
    /// Print the site id, generating and storing one on first use.
    #[command(name = "site-id")]
    SiteId,
    /// Purge credential checks.
    Credentials(CredentialsArgs),
    /// Service metadata.
    Service(ServiceArgs),
    /// API token metadata.
    Token(TokenArgs),
    /// Default VCL snippets and version contents.
    Vcl(VclArgs),
    /// Error/maintenance page.
    #[command(name = "error-page")]
    ErrorPage(ErrorPageArgs),
    /// Edge module snippets.
    #[command(name = "edge-modules")]
    EdgeModules(EdgeModulesArgs),
}

#[derive(Debug, Args, Clone)]
pub struct PurgeArgs {
    #[command(subcommand)]
    pub target: PurgeTarget,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PurgeTarget {
    /// Purge the entire service, including other sites sharing it.
    All,
    /// Purge one absolute URL.
    Url {
        #[arg(value_name = "URL", value_hint = ValueHint::Url)]
        url: String,
    },
    /// Purge the keys derived from comma-separated cache tags.
    Key {
        #[arg(value_name = "TAGS")]
        tags: String,
    },
    /// Purge everything tagged with this site's key.
    Site,
}

#[derive(Debug, Args, Clone)]
pub struct TagsArgs {
    /// Cache tags, e.g. `node:42`.
    #[arg(value_name = "TAG", required = true, num_args = 1..)]
    pub tags: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct CredentialsArgs {
    #[command(subcommand)]
    pub command: CredentialsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CredentialsCommand {
    /// Re-validate the token and store the verdict.
    Check,
}

#[derive(Debug, Args, Clone)]
pub struct ServiceArgs {
    #[command(subcommand)]
    pub command: ServiceCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ServiceCommand {
    /// Show the configured service.
    Info,
    /// List services visible to the token.
    List,
    /// Show the configured service with its versions.
    Details,
}

#[derive(Debug, Args, Clone)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum TokenCommand {
    /// Show scopes and services of the current token.
    Info,
}

#[derive(Debug, Args, Clone)]
pub struct VclArgs {
    #[command(subcommand)]
    pub command: VclCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum VclCommand {
    /// Upload the default snippets, condition and request setting to a new version.
    Upload {
        /// Activate the new version after it validates.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        activate: bool,
    },
    /// List snippets on the active version.
    Snippets,
    /// List ACLs on the active version.
    Acls,
    /// List dictionaries on the active version.
    Dictionaries,
    /// Manage the image optimizer header snippet and io settings.
    #[command(name = "image-optimizer", subcommand)]
    ImageOptimizer(ImageOptimizerCommand),
}

#[derive(Debug, Subcommand, Clone)]
pub enum ImageOptimizerCommand {
    /// Report whether image optimization is available on the service.
    Status,
    /// Upload the optimizer snippet and default io settings, then activate.
    Enable {
        /// `low`, `medium` or `high`; falls back to `image_optimizer.optimize`.
        #[arg(long, value_name = "LEVEL")]
        optimize: Option<String>,
    },
    /// Remove the optimizer snippet and activate the result.
    Disable,
}

#[derive(Debug, Args, Clone)]
pub struct ErrorPageArgs {
    #[command(subcommand)]
    pub command: ErrorPageCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ErrorPageCommand {
    /// Upload an HTML error page and activate it.
    Upload {
        #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
}

#[derive(Debug, Args, Clone)]
pub struct EdgeModulesArgs {
    #[command(subcommand)]
    pub command: EdgeModulesCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum EdgeModulesCommand {
    /// List available edge modules.
    List,
    /// Render a module from a TOML values file, upload and activate it.
    Upload {
        #[arg(value_name = "MODULE")]
        module: String,
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        values: PathBuf,
    },
    /// Remove a module's snippets and activate the result.
    Remove {
        #[arg(value_name = "MODULE")]
        module: String,
    },
}
