//
//  buildkite-cli
//  cli/user.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! User commands

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::api::User;
use crate::output::{print_field, print_header, TableOutput};

use super::Factory;

/// Inspect and invite users
#[derive(Args, Debug)]
pub struct UserCommand {
    #[command(subcommand)]
    pub command: UserSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum UserSubcommand {
    /// Invite people to the organization
    Invite(InviteArgs),

    /// Show the user and scopes behind the current token
    Whoami,
}

#[derive(Args, Debug)]
pub struct InviteArgs {
    /// Email addresses to invite
    #[arg(required = true)]
    pub emails: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Whoami {
    organization: String,
    user: User,
    token_uuid: String,
    scopes: Vec<String>,
}

impl TableOutput for Whoami {
    fn print_table(&self, out: &mut dyn Write, color: bool) -> std::io::Result<()> {
        print_header(out, &self.user.name, color)?;
        print_field(out, "Email", &self.user.email, color)?;
        print_field(out, "User ID", &self.user.id, color)?;
        print_field(out, "Organization", &self.organization, color)?;
        print_field(out, "Token", &self.token_uuid, color)?;
        if self.scopes.is_empty() {
            print_field(out, "Scopes", "-", color)
        } else {
            print_field(out, "Scopes", &self.scopes.join(", "), color)
        }
    }
}

impl UserCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        match &self.command {
            UserSubcommand::Invite(args) => self.invite(args, f).await,
            UserSubcommand::Whoami => self.whoami(f).await,
        }
    }

    async fn invite(&self, args: &InviteArgs, f: &Factory) -> Result<()> {
        let org = f.organization()?;
        let client = f.client()?;
        f.spin("Sending invitations", client.invite_users(&org, &args.emails))
            .await?;

        let out = f.output();
        out.write_success(&format!(
            "Invited {} user(s) to {}",
            args.emails.len(),
            org
        ));
        Ok(())
    }

    async fn whoami(&self, f: &Factory) -> Result<()> {
        let org = f.organization()?;
        let client = f.client()?;
        let (user, token) = f
            .spin("Loading user", async {
                tokio::try_join!(client.current_user(), client.access_token())
            })
            .await?;

        let whoami = Whoami {
            organization: org,
            user,
            token_uuid: token.uuid.clone(),
            scopes: token.scopes.clone(),
        };
        f.output().write(&whoami)
    }
}
