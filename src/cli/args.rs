use clap::Parser;

/// Fetches, pins and composes recipe repositories.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Repository holding the root package.
    ///
    /// Defaults to the current directory.
    #[clap(short, long)]
    pub root: Option<String>,
    /// Location of the checkout cache.
    ///
    /// Defaults to `$HOME/.recipefetch/cache`.
    #[clap(short, long, env = "RECIPEFETCH_CACHE_DIR")]
    pub cache_directory: Option<String>,
    /// Git executable to drive.
    #[clap(long, env = "RECIPEFETCH_GIT_BINARY")]
    pub git_binary: Option<String>,
    /// Overall deadline for VCS operations, in seconds.
    #[clap(short, long, env = "RECIPEFETCH_FETCH_TIMEOUT")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Resolves the dependencies of the root package and checks them out
    Fetch,
    /// Prints the metadata of a dependency commit, roll-candidate verdict included
    Metadata {
        project: String,
        /// Defaults to the revision the root package pins.
        #[clap(long)]
        revision: Option<String>,
    },
    /// Lists the modules and recipes visible from a package
    List {
        /// Defaults to the root package.
        #[clap(short, long)]
        package: Option<String>,
    },
    /// Prints the path of a recipe
    FindRecipe {
        name: String,
        /// Defaults to the root package.
        #[clap(short, long)]
        package: Option<String>,
    },
    /// Cleans the checkout cache
    ClearCache,
}
