//
//  buildkite-cli
//  cli/cluster.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Cluster commands

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::api::{Cluster, Queue};
use crate::output::{print_field, print_header, TableBuilder, TableOutput, TableRow};
use crate::util::format_time;

use super::Factory;

/// Manage clusters
#[derive(Args, Debug)]
pub struct ClusterCommand {
    #[command(subcommand)]
    pub command: ClusterSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ClusterSubcommand {
    /// List clusters
    #[command(visible_alias = "ls")]
    List,

    /// View a cluster and its queues
    View(ViewArgs),
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    /// Cluster ID
    pub id: String,
}

// Display types

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct ClusterRow(Cluster);

impl TableRow for ClusterRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "NAME", "DESCRIPTION", "DEFAULT QUEUE"]
    }

    fn cells(&self, _color: bool) -> Vec<String> {
        let cluster = &self.0;
        let name = match &cluster.emoji {
            Some(emoji) if !emoji.is_empty() => format!("{} {}", emoji, cluster.name),
            _ => cluster.name.clone(),
        };
        vec![
            cluster.id.clone(),
            name,
            cluster.description.clone().unwrap_or_default(),
            cluster.default_queue_id.clone().unwrap_or_else(|| "-".into()),
        ]
    }
}

#[derive(Debug, Serialize)]
struct ClusterView {
    #[serde(flatten)]
    cluster: Cluster,
}

impl TableOutput for ClusterView {
    fn print_table(&self, out: &mut dyn Write, color: bool) -> std::io::Result<()> {
        let cluster = &self.cluster;
        print_header(out, &cluster.name, color)?;
        print_field(out, "ID", &cluster.id, color)?;
        if let Some(description) = cluster.description.as_deref().filter(|d| !d.is_empty()) {
            print_field(out, "Description", description, color)?;
        }
        if let Some(created) = cluster.created_at {
            print_field(out, "Created", &format_time(created), color)?;
        }
        if let Some(url) = &cluster.web_url {
            print_field(out, "URL", url, color)?;
        }

        writeln!(out)?;
        if cluster.queues.is_empty() {
            return writeln!(out, "No queues found.");
        }
        let default_queue = cluster.default_queue_id.as_deref();
        TableBuilder::new()
            .color(color)
            .headers(["QUEUE", "ID", "DEFAULT", "DESCRIPTION"])
            .rows(cluster.queues.iter().map(|queue| {
                vec![
                    queue.key.clone(),
                    queue.id.clone(),
                    if Some(queue.id.as_str()) == default_queue { "yes".into() } else { String::new() },
                    queue.description.clone().unwrap_or_default(),
                ]
            }))
            .write_to(out)
    }
}

impl ClusterCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        match &self.command {
            ClusterSubcommand::List => self.list(f).await,
            ClusterSubcommand::View(args) => self.view(args, f).await,
        }
    }

    async fn list(&self, f: &Factory) -> Result<()> {
        let org = f.organization()?;
        let client = f.client()?;
        let clusters = f.spin("Loading clusters", client.list_clusters(&org)).await?;
        let rows: Vec<ClusterRow> = clusters.into_iter().map(ClusterRow).collect();
        f.output().write_list(&rows, "clusters")
    }

    /// Fetches the cluster and its queues concurrently.
    async fn view(&self, args: &ViewArgs, f: &Factory) -> Result<()> {
        let org = f.organization()?;
        let client = f.client()?;
        let (mut cluster, queues): (Cluster, Vec<Queue>) = f
            .spin("Loading cluster", async {
                tokio::try_join!(
                    client.get_cluster(&org, &args.id),
                    client.list_cluster_queues(&org, &args.id)
                )
            })
            .await?;
        cluster.queues = queues;
        f.output().write(&ClusterView { cluster })
    }
}
