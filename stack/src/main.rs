// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::fs;
use std::io::Write;

use anyhow::{Context, bail};
use clap::Parser;
use nag_checks::{NagPack, summarize};
use network_stack::configuration::SynthOptions;
use network_stack::constants::STAGE_ENV_VAR;
use network_stack::network::{NetworkStack, NetworkStackProps};
use network_stack::stage::select_stage;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        // stdout carries the template
        .with_writer(std::io::stderr)
        .with_current_span(false)
        // ANSI codes are noise in CI logs
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .init();

    let options = SynthOptions::parse();

    tracing::info!("[synth] {:?}", &options);

    let from_env = std::env::var(STAGE_ENV_VAR).ok();
    let stage = select_stage(options.stage.as_deref(), from_env.as_deref());

    let props = NetworkStackProps {
        project: options.project.clone(),
        stage: stage.to_string(),
        enable_optional_endpoints: options.optional_endpoints(),
    };
    let network = NetworkStack::build(&props)?;
    let template = network.synth()?;

    if options.skip_checks {
        tracing::warn!("[synth] skipping nag checks");
    } else {
        let pack = NagPack::aws_solutions();
        tracing::info!("[synth] running {} nag rules", pack.rules().len());
        let report = pack.check(&template.to_value()?)?;
        for (rule_id, count) in summarize(&report) {
            tracing::info!("[synth] {rule_id}: {count} unsuppressed findings");
        }
        let errors = report.unresolved_errors();
        for finding in &errors {
            tracing::error!(
                "[synth] {} on {} {}",
                finding.rule_id,
                finding.path.as_deref().unwrap_or(&finding.logical_id),
                finding.data.as_deref().unwrap_or_default()
            );
        }
        tracing::info!(
            "[synth] nag: {} errors, {} warnings, {} suppressed",
            errors.len(),
            report.warnings().len(),
            report.suppressed().len()
        );
        if !errors.is_empty() {
            bail!("{} unresolved nag errors in {}", errors.len(), network.name());
        }
    }

    let json = template.to_json()?;
    match &options.output_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            let path = dir.join(format!("{}.template.json", network.name()));
            fs::write(&path, json.as_bytes()).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!("[synth] wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").context("writing template to stdout")?;
        }
    }

    Ok(())
}
