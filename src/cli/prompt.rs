//
//  buildkite-cli
//  cli/prompt.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Shell prompt integration
//!
//! ```bash
//! # ~/.bashrc
//! eval "$(bk prompt --shell bash)"
//! PS1='$(__bk_prompt)'"$PS1"
//! ```

use anyhow::Result;
use clap::{Args, ValueEnum};

use super::Factory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

impl Shell {
    /// Guesses the shell from a `$SHELL` path, falling back to bash.
    fn detect(shell_path: Option<&str>) -> Self {
        let name = shell_path
            .and_then(|path| path.rsplit('/').next())
            .unwrap_or_default();
        match name {
            "zsh" => Shell::Zsh,
            "fish" => Shell::Fish,
            _ => Shell::Bash,
        }
    }

    fn snippet(self) -> &'static str {
        match self {
            Shell::Bash => {
                r#"__bk_prompt() {
  local org
  org="$(bk prompt --print 2>/dev/null)"
  [ -n "$org" ] && printf '[bk:%s] ' "$org"
}
"#
            }
            Shell::Zsh => {
                r#"setopt PROMPT_SUBST
__bk_prompt() {
  local org
  org="$(bk prompt --print 2>/dev/null)"
  [[ -n "$org" ]] && print -n "[bk:${org}] "
}
"#
            }
            Shell::Fish => {
                r#"function __bk_prompt
    set -l org (bk prompt --print 2>/dev/null)
    test -n "$org"; and printf '[bk:%s] ' $org
end
"#
            }
        }
    }
}

/// Show the selected organization in your shell prompt
#[derive(Args, Debug, Default)]
pub struct PromptCommand {
    /// Shell to generate the snippet for (defaults to $SHELL)
    #[arg(long, value_enum)]
    pub shell: Option<Shell>,

    /// Print the selected organization and exit
    #[arg(long)]
    pub print: bool,
}

impl PromptCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        if self.print {
            let org = f.config().organization_slug();
            if !org.is_empty() {
                println!("{}", org);
            }
            return Ok(());
        }

        let shell = self
            .shell
            .unwrap_or_else(|| Shell::detect(std::env::var("SHELL").ok().as_deref()));
        tracing::debug!("Generating prompt snippet for {:?}", shell);
        print!("{}", shell.snippet());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_shell() {
        assert_eq!(Shell::detect(Some("/usr/bin/zsh")), Shell::Zsh);
        assert_eq!(Shell::detect(Some("/opt/homebrew/bin/fish")), Shell::Fish);
        assert_eq!(Shell::detect(Some("/bin/bash")), Shell::Bash);
        assert_eq!(Shell::detect(Some("/bin/tcsh")), Shell::Bash);
        assert_eq!(Shell::detect(None), Shell::Bash);
    }

    #[test]
    fn test_snippets_call_print() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
            let snippet = shell.snippet();
            assert!(snippet.contains("__bk_prompt"));
            assert!(snippet.contains("bk prompt --print"));
        }
        assert!(Shell::Zsh.snippet().starts_with("setopt PROMPT_SUBST"));
    }
}
