// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
mod format;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use sf_config::{ForgeConfig, ForgeConfigOverlay};
use sf_core::SideEffectClass;
use sf_ledger::LedgerStore;
use sf_registry::SkillResolver;
use sf_skill_api::Skill;

use format::{print_value, OutputFormat};

/// Exit code for precondition errors: missing ledger, corrupt registry,
/// not-found ids. Recorded within-band failures (a failed `consume`, a
/// `FAILED` build) are not errors from the CLI's point of view and exit 0.
const EXIT_RUNTIME_ERROR: i32 = 1;

/// Conventional root compiled skill implementations live under, matching
/// `sf_sandbox::BuildRequest::allowed_paths`'s `crates/sf-skills/{name}` layout.
const DEFAULT_SKILLS_ROOT: &str = "crates/sf-skills";

#[derive(Parser, Debug)]
#[command(name = "skill-forge", version, about = "Skill proposal, build, and governance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Path to a TOML config file. Overlaid on the built-in defaults, then
    /// overlaid in turn by `SKILL_FORGE_*` env vars, then by the flags below.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format for structured results.
    #[arg(long, global = true, default_value = "json-pretty")]
    output: OutputFormat,

    /// Root compiled skill implementations live under.
    #[arg(long, global = true, default_value = DEFAULT_SKILLS_ROOT)]
    skills_root: PathBuf,

    #[arg(long, global = true)]
    ledger_db_path: Option<PathBuf>,
    #[arg(long, global = true)]
    registry_path: Option<PathBuf>,
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    log_path: Option<PathBuf>,
    #[arg(long, global = true)]
    policy_file: Option<PathBuf>,
    #[arg(long, global = true)]
    lm_gateway_addr: Option<String>,
    #[arg(long, global = true)]
    builder_binary_name: Option<String>,
    #[arg(long, global = true)]
    build_timeout_secs: Option<u64>,
    #[arg(long, global = true)]
    verify_timeout_secs: Option<u64>,
}

impl Cli {
    fn config_overlay(&self) -> ForgeConfigOverlay {
        ForgeConfigOverlay {
            ledger_db_path: self.ledger_db_path.clone(),
            registry_path: self.registry_path.clone(),
            output_dir: self.output_dir.clone(),
            log_path: self.log_path.clone(),
            policy_file: self.policy_file.clone(),
            lm_gateway_addr: self.lm_gateway_addr.clone(),
            builder_binary_name: self.builder_binary_name.clone(),
            build_timeout_secs: self.build_timeout_secs,
            verify_timeout_secs: self.verify_timeout_secs,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum EffectClassArg {
    ReadOnly,
    FileWrite,
    Network,
    SecretRead,
    Money,
    Messaging,
}

impl From<EffectClassArg> for SideEffectClass {
    fn from(v: EffectClassArg) -> Self {
        match v {
            EffectClassArg::ReadOnly => SideEffectClass::ReadOnly,
            EffectClassArg::FileWrite => SideEffectClass::FileWrite,
            EffectClassArg::Network => SideEffectClass::Network,
            EffectClassArg::SecretRead => SideEffectClass::SecretRead,
            EffectClassArg::Money => SideEffectClass::Money,
            EffectClassArg::Messaging => SideEffectClass::Messaging,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Propose a new skill: writes a ledger row and a spec artifact.
    Propose {
        /// Skill name; also the registry key once promoted.
        #[arg(long)]
        name: String,
        /// What the skill does and why it was proposed.
        #[arg(long)]
        description: String,
        /// Path to a file containing the skill's JSON Schema I/O contract.
        #[arg(long)]
        io_schema_file: PathBuf,
        /// Declared side-effect class.
        #[arg(long, value_enum)]
        effect_class: EffectClassArg,
        /// Names of secrets this skill requires at runtime. May be repeated.
        #[arg(long = "required-secret")]
        required_secrets: Vec<String>,
    },

    /// Drive a sandboxed build attempt for a proposed skill.
    Build {
        /// The proposal to build.
        #[arg(long)]
        proposal_id: String,
        /// Root of the real workspace to stage into the sandbox.
        #[arg(long, default_value = ".")]
        source_root: PathBuf,
    },

    /// Run lint/type-check/test/policy/invariant checks on a built skill.
    Verify {
        /// The proposal to verify; must currently be `BUILT`.
        #[arg(long)]
        proposal_id: String,
        /// Path to the built skill's source file.
        #[arg(long)]
        skill_file: PathBuf,
        /// Directory to run lint/type-check/test tools in.
        #[arg(long, default_value = ".")]
        project_root: PathBuf,
    },

    /// Promote a verified proposal to `TRUSTED`.
    Promote {
        /// The proposal to promote; must currently be `VERIFIED`.
        #[arg(long)]
        proposal_id: String,
        /// Identity recorded as having approved this promotion.
        #[arg(long)]
        approved_by: Option<String>,
    },

    /// Invoke a single trusted skill.
    Consume {
        /// Registry name of the skill to invoke.
        skill_name: String,
        /// Raw JSON input for the skill.
        #[arg(long)]
        input: String,
    },

    /// Invoke a deterministic chain of trusted skills.
    ConsumeChain {
        /// Path to a JSON file holding a `ChainSpec`.
        spec_file: PathBuf,
    },

    /// Re-verify trust and re-execute a past execution with the same input.
    Replay {
        /// The execution id to replay.
        execution_id: String,
    },

    /// Reconstruct and render the execution tree an id belongs to.
    Session {
        /// Any execution id within the session.
        execution_id: String,
    },
}

/// Stands in for a real skill-implementation binary's static name→constructor
/// table. No `sf-skills/*` crates exist in this workspace yet, so every
/// lookup fails with `NotFound` — `consume`/`consume-chain`/`replay` are
/// wired end-to-end, but have nothing concrete to resolve against until a
/// binary links in actual skill implementations and supplies its own
/// `SkillResolver`.
struct EmptyResolver;

impl SkillResolver for EmptyResolver {
    fn resolve(&self, _module_reference: &str) -> Option<Arc<dyn Skill>> {
        None
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("sf=debug")
    } else {
        EnvFilter::new("sf=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match sf_config::load_config(cli.config.as_deref(), cli.config_overlay()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    };

    let result = match &cli.command {
        Commands::Propose {
            name,
            description,
            io_schema_file,
            effect_class,
            required_secrets,
        } => cmd_propose(
            &config,
            name,
            description,
            io_schema_file,
            (*effect_class).into(),
            required_secrets,
            cli.output,
        ),
        Commands::Build { proposal_id, source_root } => {
            cmd_build(&config, proposal_id, source_root, cli.output)
        }
        Commands::Verify {
            proposal_id,
            skill_file,
            project_root,
        } => cmd_verify(&config, proposal_id, skill_file, project_root, cli.output),
        Commands::Promote { proposal_id, approved_by } => {
            cmd_promote(&config, &cli.skills_root, proposal_id, approved_by.as_deref(), cli.output)
        }
        Commands::Consume { skill_name, input } => {
            cmd_consume(&config, &cli.skills_root, skill_name, input, cli.output)
        }
        Commands::ConsumeChain { spec_file } => {
            cmd_consume_chain(&config, &cli.skills_root, spec_file, cli.output)
        }
        Commands::Replay { execution_id } => {
            cmd_replay(&config, &cli.skills_root, execution_id, cli.output)
        }
        Commands::Session { execution_id } => cmd_session(&config, execution_id, cli.output),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

fn open_ledger(config: &ForgeConfig) -> Result<LedgerStore> {
    LedgerStore::open(&config.ledger_db_path)
        .with_context(|| format!("opening ledger at {}", config.ledger_db_path.display()))
}

/// `propose` has no dedicated crate (see DESIGN.md): it is just a
/// ledger-insert plus an artifact write, mirroring the original's
/// `kavi.forge.propose.propose_skill`.
fn cmd_propose(
    config: &ForgeConfig,
    name: &str,
    description: &str,
    io_schema_file: &Path,
    effect_class: SideEffectClass,
    required_secrets: &[String],
    output: OutputFormat,
) -> Result<()> {
    let ledger = open_ledger(config)?;
    let io_schema_json = std::fs::read_to_string(io_schema_file)
        .with_context(|| format!("reading io schema file {}", io_schema_file.display()))?;
    serde_json::from_str::<Value>(&io_schema_json).context("io schema file is not valid JSON")?;
    let required_secrets_json = serde_json::to_string(required_secrets)?;

    let proposal = sf_core::SkillProposal::new(
        name,
        description,
        io_schema_json.clone(),
        effect_class,
        required_secrets_json.clone(),
    );
    ledger.insert_proposal(&proposal).context("inserting proposal")?;

    let artifact = sf_artifact::write_skill_spec(
        &ledger,
        &config.output_dir,
        &proposal.name,
        &proposal.description,
        &proposal.io_schema_json,
        effect_class.variant_name(),
        &proposal.required_secrets_json,
        &proposal.id,
    )
    .context("writing skill spec artifact")?;

    print_value(output, &serde_json::json!({ "proposal": proposal, "artifact": artifact }));
    Ok(())
}

fn cmd_build(config: &ForgeConfig, proposal_id: &str, source_root: &Path, output: OutputFormat) -> Result<()> {
    let ledger = open_ledger(config)?;
    let proposal = ledger.get_proposal(proposal_id).context("loading proposal")?;

    let mut request = sf_sandbox::BuildRequest::new(
        source_root.to_path_buf(),
        proposal.id.clone(),
        proposal.name.clone(),
        config.output_dir.clone(),
    );
    request.builder_binary = config.builder_binary_name.clone();
    request.timeout = config.build_timeout();
    let outcome = sf_sandbox::run_build(&ledger, &request).context("running sandboxed build")?;

    print_value(
        output,
        &serde_json::json!({
            "build": outcome.build,
            "changed_paths": outcome.changed_paths,
            "gate_passed": outcome.gate_passed,
            "exit_code": outcome.exit_code,
        }),
    );
    Ok(())
}

/// When `config.policy_file` does not exist, falls back to the most
/// permissive-but-safe literal policy (no forbidden imports beyond none
/// declared, no network, no write paths, dynamic-exec still forbidden)
/// rather than treating a missing policy file as a precondition error —
/// `sf-policy::Policy` has no `Default` impl on purpose (a policy should
/// normally be explicit), but a CLI wrapper with nothing configured yet
/// should not hard-fail every `verify` call.
fn load_policy_or_default(path: &Path) -> Result<sf_policy::Policy> {
    if path.exists() {
        sf_policy::Policy::from_yaml(path).context("loading policy file")
    } else {
        Ok(sf_policy::Policy {
            forbidden_imports: Vec::new(),
            allowed_network: false,
            allowed_write_paths: Vec::new(),
            forbid_dynamic_exec: true,
        })
    }
}

fn cmd_verify(
    config: &ForgeConfig,
    proposal_id: &str,
    skill_file: &Path,
    project_root: &Path,
    output: OutputFormat,
) -> Result<()> {
    let ledger = open_ledger(config)?;
    let proposal = ledger.get_proposal(proposal_id).context("loading proposal")?;
    let policy = load_policy_or_default(&config.policy_file)?;

    let request = sf_verify::VerifyRequest {
        proposal: &proposal,
        skill_file,
        project_root,
        output_dir: &config.output_dir,
        policy: &policy,
    };
    let runner = sf_verify::ProcessToolRunner {
        timeout: config.verify_timeout(),
    };
    let verification = sf_verify::verify_skill(&ledger, &runner, &request).context("verifying skill")?;
    let promoted_to_verified = sf_verify::mark_verified_if_passed(&ledger, proposal_id)
        .context("updating proposal status after verification")?;

    print_value(output, &serde_json::json!({
        "verification": verification,
        "promoted_to_verified": promoted_to_verified,
    }));
    Ok(())
}

fn cmd_promote(
    config: &ForgeConfig,
    skills_root: &Path,
    proposal_id: &str,
    approved_by: Option<&str>,
    output: OutputFormat,
) -> Result<()> {
    let ledger = open_ledger(config)?;
    let approved_by = approved_by.unwrap_or(sf_promote::DEFAULT_APPROVED_BY);
    let request = sf_promote::PromoteRequest {
        proposal_id,
        skills_root,
        registry_path: &config.registry_path,
        approved_by,
    };
    let promotion = sf_promote::promote_skill(&ledger, &request).context("promoting skill")?;

    print_value(output, &promotion);
    Ok(())
}

fn cmd_consume(config: &ForgeConfig, skills_root: &Path, skill_name: &str, input: &str, output: OutputFormat) -> Result<()> {
    let raw_input: Value = serde_json::from_str(input).context("input is not valid JSON")?;
    let resolver = EmptyResolver;
    let writer = sf_execlog::ExecutionLogWriter::at(config.log_path.clone());
    let record = sf_consumer::consume_and_log(
        &config.registry_path,
        skills_root,
        skill_name,
        &resolver,
        raw_input,
        &writer,
    )
    .context("appending execution record")?;

    print_value(output, &record);
    Ok(())
}

fn cmd_consume_chain(config: &ForgeConfig, skills_root: &Path, spec_file: &Path, output: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(spec_file)
        .with_context(|| format!("reading chain spec {}", spec_file.display()))?;
    let spec: sf_core::ChainSpec = serde_json::from_str(&content).context("chain spec is not valid JSON")?;
    let resolver = EmptyResolver;
    let records = sf_chain::consume_chain(&config.registry_path, skills_root, &resolver, &spec);

    let writer = sf_execlog::ExecutionLogWriter::at(config.log_path.clone());
    for record in &records {
        writer.append(record).context("appending chain execution record")?;
    }

    print_value(output, &records);
    Ok(())
}

fn cmd_replay(config: &ForgeConfig, skills_root: &Path, execution_id: &str, output: OutputFormat) -> Result<()> {
    let resolver = EmptyResolver;
    let (original, new_record) = sf_session::replay_execution(
        &config.log_path,
        &config.registry_path,
        skills_root,
        &resolver,
        execution_id,
    )
    .context("replaying execution")?;

    let writer = sf_execlog::ExecutionLogWriter::at(config.log_path.clone());
    writer.append(&new_record).context("appending replay execution record")?;

    print_value(output, &serde_json::json!({ "original": original, "replayed": new_record }));
    Ok(())
}

fn cmd_session(config: &ForgeConfig, execution_id: &str, output: OutputFormat) -> Result<()> {
    let records = sf_session::build_session(&config.log_path, execution_id).context("building session")?;

    match output {
        OutputFormat::Text => println!("{}", sf_session::render_session_tree(&records)),
        _ => print_value(output, &records),
    }
    Ok(())
}
