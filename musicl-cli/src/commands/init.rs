//! `musicl init [--github <owner/repo>] [--branch <name>]`

use anyhow::{bail, Context, Result};
use clap::Args;

use musicl_core::config::{self, GithubTarget, StoreTarget};

use super::home_dir;

/// Create `~/.musicl/config.yaml` with default settings.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Store playlists in a GitHub repository instead of `~/.musicl/store`.
    #[arg(long, value_name = "OWNER/REPO")]
    pub github: Option<String>,

    /// Branch used with `--github`.
    #[arg(long, requires = "github", default_value = "main")]
    pub branch: String,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let (mut config, created) =
            config::init_at(&home).context("failed to initialize musicl config")?;
        let path = config::config_path_at(&home);

        if let Some(slug) = self.github {
            let Some((owner, repo)) = slug.split_once('/').filter(|(o, r)| !o.is_empty() && !r.is_empty())
            else {
                bail!("--github expects OWNER/REPO, got '{slug}'");
            };
            config.settings.store = StoreTarget::Github(GithubTarget {
                owner: owner.to_string(),
                repo: repo.to_string(),
                branch: self.branch,
                token: None,
                token_env: "GITHUB_TOKEN".to_string(),
                api_base: "https://api.github.com".to_string(),
            });
            config::save_at(&home, &config)
                .with_context(|| format!("failed to save {}", path.display()))?;
            println!("✓ Store set to github.com/{owner}/{repo}");
        }

        if created {
            println!("✓ Created {}", path.display());
        } else {
            println!("· {} already exists", path.display());
        }
        println!("  Next: musicl feed add <id> <source-url>");
        Ok(())
    }
}
