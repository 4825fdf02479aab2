use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use aivenctl_core::config::{Config, references};
use aivenctl_core::differ::create_plan;
use aivenctl_core::effect::Effect;
use aivenctl_core::interpreter::{
    ApplyResult, Bindings, EffectOutcome, Interpreter, InterpreterConfig, binding_attributes,
};
use aivenctl_core::plan::Plan;
use aivenctl_core::provider::{Provider, ResourceType};
use aivenctl_core::resource::{Resource, ResourceId, State, Value};
use aivenctl_core::schema::ResourceSchema;
use aivenctl_provider::{AivenClient, AivenProvider, Timeouts};
use aivenctl_state::{LocalBackend, ResourceState, StateBackend, StateFile};

mod display;

use display::{display_value, print_plan};

const PROVIDER_NAME: &str = "aiven";
const DEFAULT_CONFIG: &str = "aivenctl.json";
const TERMINATION_PROTECTION: &str = "termination_protection";

#[derive(Parser)]
#[command(name = "aivenctl")]
#[command(about = "Declarative management of Aiven projects and services", long_about = None)]
struct Cli {
    /// Aiven API token
    #[arg(long, env = "AIVEN_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Aiven API base URL (overrides the configuration file)
    #[arg(long, env = "AIVEN_API_URL", global = true)]
    api_url: Option<String>,

    /// Path to the state file
    #[arg(long, global = true, default_value = LocalBackend::DEFAULT_STATE_FILE)]
    state: PathBuf,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        #[arg(default_value = DEFAULT_CONFIG)]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        #[arg(default_value = DEFAULT_CONFIG)]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        #[arg(default_value = DEFAULT_CONFIG)]
        file: PathBuf,

        /// Keep going after a failed change
        #[arg(long)]
        continue_on_error: bool,
    },
    /// Destroy every resource recorded in the state file
    Destroy {
        #[arg(default_value = DEFAULT_CONFIG)]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Inspect or repair the state file
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// List recorded resources
    List,
    /// Show the recorded attributes of one resource (e.g. "pg.db")
    Show { address: String },
    /// Remove a stale lock
    ForceUnlock { lock_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let backend = LocalBackend::with_path(cli.state.clone());
    let result = match &cli.command {
        Commands::Validate { file } => run_validate(file),
        Commands::Plan { file } => run_plan(&cli, file, &backend).await,
        Commands::Apply {
            file,
            continue_on_error,
        } => run_apply(&cli, file, &backend, *continue_on_error).await,
        Commands::Destroy { file, auto_approve } => {
            run_destroy(&cli, file, &backend, *auto_approve).await
        }
        Commands::State { command } => run_state_command(command, &backend).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Schemas of every supported type, split by resources and data sources
struct Schemas {
    resources: HashMap<String, ResourceSchema>,
    data_sources: HashMap<String, ResourceSchema>,
    local_attributes: HashMap<String, &'static [&'static str]>,
}

impl Schemas {
    fn from_types(types: Vec<Box<dyn ResourceType>>) -> Self {
        let mut schemas = Schemas {
            resources: HashMap::new(),
            data_sources: HashMap::new(),
            local_attributes: HashMap::new(),
        };
        for t in types {
            if t.is_data_source() {
                schemas.data_sources.insert(t.name().to_string(), t.schema());
            } else {
                schemas
                    .local_attributes
                    .insert(t.name().to_string(), t.local_attributes());
                schemas.resources.insert(t.name().to_string(), t.schema());
            }
        }
        schemas
    }

    fn load() -> Self {
        Self::from_types(aivenctl_provider::resource_types())
    }

    fn for_resource(&self, resource: &Resource) -> Option<&ResourceSchema> {
        if resource.is_data_source() {
            self.data_sources.get(&resource.id.resource_type)
        } else {
            self.resources.get(&resource.id.resource_type)
        }
    }

    fn local_attributes(&self, resource_type: &str) -> &'static [&'static str] {
        self.local_attributes
            .get(resource_type)
            .copied()
            .unwrap_or_default()
    }
}

fn load_config(file: &Path) -> Result<Config, String> {
    Config::load(file).map_err(|e| format!("Failed to load {}: {}", file.display(), e))
}

fn validate_resources(resources: &[Resource], schemas: &Schemas) -> Result<(), String> {
    let mut all_errors = Vec::new();

    for resource in resources {
        let kind = if resource.is_data_source() {
            "data source"
        } else {
            "resource"
        };
        let Some(schema) = schemas.for_resource(resource) else {
            all_errors.push(format!(
                "{}: unknown {} type '{}'",
                resource.id, kind, resource.id.resource_type
            ));
            continue;
        };

        if let Some(deprecation) = &schema.deprecation {
            println!("{} {}: {}", "Warning:".yellow().bold(), resource.id, deprecation);
        }
        for key in resource.attributes.keys() {
            if let Some(message) = schema.get(key).and_then(|a| a.deprecated.as_ref()) {
                println!(
                    "{} {}.{} is deprecated: {}",
                    "Warning:".yellow().bold(),
                    resource.id,
                    key,
                    message
                );
            }
        }

        if let Err(errors) = schema.validate(&resource.attributes) {
            for error in errors {
                all_errors.push(format!("{}: {}", resource.id, error));
            }
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Validation failed:\n  {}", all_errors.join("\n  ")))
    }
}

fn run_validate(file: &Path) -> Result<(), String> {
    let config = load_config(file)?;

    println!("{}", "Validating...".cyan());

    validate_resources(&config.resources, &Schemas::load())?;
    sort_resources_by_dependencies(&config.resources)?;
    Timeouts::from_config(&config.provider.timeouts).map_err(|e| e.to_string())?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            config.resources.len()
        )
        .green()
        .bold()
    );

    for resource in &config.resources {
        let prefix = if resource.is_data_source() { "data." } else { "" };
        println!("  • {}{}", prefix, resource.id);
    }

    Ok(())
}

fn get_provider(cli: &Cli, config: &Config) -> Result<AivenProvider, String> {
    let token = cli.token.clone().unwrap_or_default();
    let mut client = AivenClient::new(token).map_err(|e| e.to_string())?;
    if let Some(url) = cli.api_url.as_ref().or(config.provider.api_url.as_ref()) {
        client = client.with_base_url(url);
    }
    let timeouts = Timeouts::from_config(&config.provider.timeouts).map_err(|e| e.to_string())?;
    Ok(AivenProvider::new(client, timeouts))
}

/// Configuration and state resolved against the live API
struct Refreshed {
    /// Desired resources in dependency order, known references resolved
    resources: Vec<Resource>,
    current_states: HashMap<ResourceId, State>,
    bindings: Bindings,
    /// Recorded resources missing from the configuration, in deletion order
    orphans: Vec<(ResourceId, String)>,
    /// Recorded resources that no longer exist remotely
    gone: Vec<ResourceId>,
    /// Bindings each configured resource references
    dependencies: HashMap<ResourceId, Vec<String>>,
}

/// Read the remote state of everything the configuration and the state file
/// mention. Data sources are looked up as soon as their inputs are known.
async fn refresh(
    provider: &AivenProvider,
    config: &Config,
    state_file: &StateFile,
    schemas: &Schemas,
) -> Result<Refreshed, String> {
    let mut refreshed = Refreshed {
        resources: Vec::new(),
        current_states: HashMap::new(),
        bindings: Bindings::new(),
        orphans: Vec::new(),
        gone: Vec::new(),
        dependencies: HashMap::new(),
    };

    for resource in sort_resources_by_dependencies(&config.resources)? {
        let resolved = resolve_known(&resource, &refreshed.bindings);
        let mut deps: Vec<String> = get_resource_dependencies(&resource).into_iter().collect();
        deps.sort();
        refreshed.dependencies.insert(resource.id.clone(), deps);

        if resolved.is_data_source() {
            if !has_references(&resolved) {
                let state = provider
                    .read_data_source(&resolved)
                    .await
                    .map_err(|e| format!("Failed to read data source: {}", e))?;
                refreshed
                    .bindings
                    .insert(resolved.id.name.clone(), binding_attributes(&state));
            }
            refreshed.resources.push(resolved);
            continue;
        }

        if let Some(recorded) = state_file.find_resource(&resource.id.resource_type, &resource.id.name)
        {
            let state = refresh_recorded(provider, recorded, schemas).await?;
            if state.exists {
                refreshed
                    .bindings
                    .insert(resolved.id.name.clone(), binding_attributes(&state));
            } else {
                log::info!("{} was deleted outside aivenctl", resolved.id);
                refreshed.gone.push(resolved.id.clone());
            }
            refreshed.current_states.insert(resolved.id.clone(), state);
        }
        refreshed.resources.push(resolved);
    }

    let configured: HashSet<ResourceId> = config
        .resources
        .iter()
        .filter(|r| !r.is_data_source())
        .map(|r| r.id.clone())
        .collect();
    for recorded in state_file.removal_order() {
        let id = recorded.resource_id();
        if configured.contains(&id) {
            continue;
        }
        let state = refresh_recorded(provider, recorded, schemas).await?;
        if state.exists {
            refreshed
                .orphans
                .push((id.clone(), recorded.identifier.clone()));
            refreshed.current_states.insert(id, state);
        } else {
            refreshed.gone.push(id);
        }
    }

    Ok(refreshed)
}

async fn refresh_recorded(
    provider: &AivenProvider,
    recorded: &ResourceState,
    schemas: &Schemas,
) -> Result<State, String> {
    let id = recorded.resource_id();
    let state = provider
        .read(&id, &recorded.identifier)
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?;
    Ok(state.carry_attributes(
        &recorded.to_state().attributes,
        schemas.local_attributes(&id.resource_type),
    ))
}

fn check_protected(plan: &Plan, current_states: &HashMap<ResourceId, State>) -> Result<(), String> {
    let protected = plan.protected_removals(current_states, TERMINATION_PROTECTION);
    if protected.is_empty() {
        return Ok(());
    }
    let names: Vec<String> = protected.iter().map(|id| id.to_string()).collect();
    Err(format!(
        "refusing to delete resources with termination_protection enabled: {}",
        names.join(", ")
    ))
}

async fn build_plan(
    cli: &Cli,
    file: &Path,
    backend: &LocalBackend,
) -> Result<(AivenProvider, Schemas, StateFile, Refreshed, Plan), String> {
    let config = load_config(file)?;
    let schemas = Schemas::load();
    validate_resources(&config.resources, &schemas)?;

    let provider = get_provider(cli, &config)?;
    let state_file = backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default();

    let refreshed = refresh(&provider, &config, &state_file, &schemas).await?;
    let plan = create_plan(
        &refreshed.resources,
        &refreshed.current_states,
        &schemas.resources,
        &refreshed.orphans,
    );
    Ok((provider, schemas, state_file, refreshed, plan))
}

async fn run_plan(cli: &Cli, file: &Path, backend: &LocalBackend) -> Result<(), String> {
    let (_, schemas, _, refreshed, plan) = build_plan(cli, file, backend).await?;
    print_plan(&plan, &schemas.resources);
    check_protected(&plan, &refreshed.current_states)
}

async fn run_apply(
    cli: &Cli,
    file: &Path,
    backend: &LocalBackend,
    continue_on_error: bool,
) -> Result<(), String> {
    let lock = backend
        .acquire_lock("apply")
        .await
        .map_err(|e| e.to_string())?;
    let result = apply_locked(cli, file, backend, continue_on_error).await;
    backend
        .release_lock(&lock)
        .await
        .map_err(|e| format!("Failed to release state lock: {}", e))?;
    result
}

async fn apply_locked(
    cli: &Cli,
    file: &Path,
    backend: &LocalBackend,
    continue_on_error: bool,
) -> Result<(), String> {
    let (provider, schemas, mut state_file, refreshed, plan) =
        build_plan(cli, file, backend).await?;
    check_protected(&plan, &refreshed.current_states)?;

    record_refresh(&mut state_file, &refreshed);

    if plan.has_no_changes() {
        record_dependencies(&mut state_file, &refreshed.dependencies);
        save_state(backend, &mut state_file).await?;
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&plan, &schemas.resources);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let interpreter = Interpreter::new(provider)
        .with_config(InterpreterConfig {
            dry_run: false,
            continue_on_error,
        })
        .with_bindings(refreshed.bindings);
    let result = interpreter.apply(&plan).await;

    print_outcomes(&plan, &result);
    record_outcomes(&mut state_file, &result);
    record_dependencies(&mut state_file, &refreshed.dependencies);
    save_state(backend, &mut state_file).await?;

    println!();
    let changes = result
        .outcomes
        .iter()
        .filter(|(_, outcome)| {
            matches!(
                outcome,
                Ok(EffectOutcome::Created { .. }
                    | EffectOutcome::Updated { .. }
                    | EffectOutcome::Replaced { .. }
                    | EffectOutcome::Deleted)
            )
        })
        .count();
    if result.is_success() {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", changes)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

async fn run_destroy(
    cli: &Cli,
    file: &Path,
    backend: &LocalBackend,
    auto_approve: bool,
) -> Result<(), String> {
    let lock = backend
        .acquire_lock("destroy")
        .await
        .map_err(|e| e.to_string())?;
    let result = destroy_locked(cli, file, backend, auto_approve).await;
    backend
        .release_lock(&lock)
        .await
        .map_err(|e| format!("Failed to release state lock: {}", e))?;
    result
}

async fn destroy_locked(
    cli: &Cli,
    file: &Path,
    backend: &LocalBackend,
    auto_approve: bool,
) -> Result<(), String> {
    let config = load_config(file)?;
    let schemas = Schemas::load();
    let provider = get_provider(cli, &config)?;
    let Some(mut state_file) = backend.read_state().await.map_err(|e| e.to_string())? else {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    };

    // Everything recorded counts as an orphan of an empty configuration
    let empty = Config {
        provider: config.provider.clone(),
        resources: Vec::new(),
    };
    let refreshed = refresh(&provider, &empty, &state_file, &schemas).await?;
    record_refresh(&mut state_file, &refreshed);

    let plan = create_plan(&[], &refreshed.current_states, &schemas.resources, &refreshed.orphans);
    if plan.is_empty() {
        save_state(backend, &mut state_file).await?;
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }
    check_protected(&plan, &refreshed.current_states)?;

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!("Plan: {} to destroy.", plan.effects().len().to_string().red());
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!();
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let result = Interpreter::new(provider).apply(&plan).await;
    print_outcomes(&plan, &result);
    record_outcomes(&mut state_file, &result);
    save_state(backend, &mut state_file).await?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!(
                "Destroy complete! {} resources destroyed.",
                result.success_count
            )
            .green()
            .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    Ok(input.trim() == "yes")
}

fn print_outcomes(plan: &Plan, result: &ApplyResult) {
    for (effect, (_, outcome)) in plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(EffectOutcome::Read { .. }) => {}
            Ok(_) => println!("  {} {}", "✓".green(), format_effect(effect)),
            Err(e) => println!("  {} {} - {}", "✗".red(), format_effect(effect), e.message),
        }
    }
}

fn format_effect(effect: &Effect) -> String {
    let verb = match effect {
        Effect::Read(_) => "Read",
        Effect::Create(_) => "Create",
        Effect::Update { .. } => "Update",
        Effect::Replace { .. } => "Replace",
        Effect::Delete { .. } => "Delete",
    };
    format!("{} {}", verb, effect.resource_id())
}

/// Bring recorded attributes up to date and forget vanished resources
fn record_refresh(state_file: &mut StateFile, refreshed: &Refreshed) {
    for state in refreshed.current_states.values() {
        if let Some(recorded) = ResourceState::from_state(state, PROVIDER_NAME) {
            state_file.upsert_resource(recorded);
        }
    }
    for id in &refreshed.gone {
        state_file.remove_resource(&id.resource_type, &id.name);
    }
}

fn record_outcomes(state_file: &mut StateFile, result: &ApplyResult) {
    for (id, outcome) in &result.outcomes {
        match outcome {
            Ok(EffectOutcome::Created { state })
            | Ok(EffectOutcome::Updated { state })
            | Ok(EffectOutcome::Replaced { state }) => {
                if let Some(recorded) = ResourceState::from_state(state, PROVIDER_NAME) {
                    state_file.upsert_resource(recorded);
                }
            }
            Ok(EffectOutcome::Deleted) => {
                state_file.remove_resource(&id.resource_type, &id.name);
            }
            Ok(EffectOutcome::Read { .. }) | Ok(EffectOutcome::Skipped { .. }) | Err(_) => {}
        }
    }
}

fn record_dependencies(state_file: &mut StateFile, dependencies: &HashMap<ResourceId, Vec<String>>) {
    for (id, deps) in dependencies {
        state_file.set_dependencies(&id.resource_type, &id.name, deps.clone());
    }
}

async fn save_state(backend: &LocalBackend, state_file: &mut StateFile) -> Result<(), String> {
    state_file.increment_serial();
    backend
        .write_state(state_file)
        .await
        .map_err(|e| format!("Failed to write state to {}: {}", backend.location(), e))
}

async fn run_state_command(command: &StateCommands, backend: &LocalBackend) -> Result<(), String> {
    match command {
        StateCommands::List => {
            let Some(state_file) = backend.read_state().await.map_err(|e| e.to_string())? else {
                println!("{}", "No state recorded.".yellow());
                return Ok(());
            };
            for r in &state_file.resources {
                println!("{}  {}", r.resource_id().to_string().bold(), r.identifier);
            }
            Ok(())
        }
        StateCommands::Show { address } => {
            let (resource_type, name) = address
                .split_once('.')
                .ok_or_else(|| format!("Invalid address '{}', expected TYPE.NAME", address))?;
            let state_file = backend
                .read_state()
                .await
                .map_err(|e| e.to_string())?
                .unwrap_or_default();
            let recorded = state_file
                .find_resource(resource_type, name)
                .ok_or_else(|| format!("{} is not in the state", address))?;

            let schemas = Schemas::load();
            let schema = schemas.resources.get(resource_type);
            let state = recorded.to_state();
            println!("{} {}", address.cyan().bold(), recorded.identifier);
            let mut keys: Vec<_> = state.attributes.keys().collect();
            keys.sort();
            for key in keys {
                println!(
                    "    {}: {}",
                    key,
                    display_value(schema, key, &state.attributes[key])
                );
            }
            Ok(())
        }
        StateCommands::ForceUnlock { lock_id } => {
            backend
                .force_unlock(lock_id)
                .await
                .map_err(|e| e.to_string())?;
            println!("{}", format!("Lock {} released.", lock_id).green());
            Ok(())
        }
    }
}

/// Binding names a resource depends on
fn get_resource_dependencies(resource: &Resource) -> HashSet<String> {
    resource
        .attributes
        .values()
        .flat_map(references)
        .map(str::to_string)
        .collect()
}

/// Sort resources so that every resource comes after the ones it references.
/// A reference cycle is an error naming the bindings involved.
fn sort_resources_by_dependencies(resources: &[Resource]) -> Result<Vec<Resource>, String> {
    let by_binding: HashMap<&str, &Resource> = resources
        .iter()
        .map(|r| (r.id.name.as_str(), r))
        .collect();

    let mut sorted = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut path: Vec<String> = Vec::new();

    fn visit(
        resource: &Resource,
        by_binding: &HashMap<&str, &Resource>,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
        sorted: &mut Vec<Resource>,
    ) -> Result<(), String> {
        let binding = resource.id.name.clone();
        if visited.contains(&binding) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|b| *b == binding) {
            let mut cycle = path[start..].to_vec();
            cycle.push(binding);
            return Err(format!("Dependency cycle: {}", cycle.join(" -> ")));
        }
        path.push(binding.clone());

        let mut deps: Vec<_> = get_resource_dependencies(resource).into_iter().collect();
        deps.sort();
        for dep in deps {
            if let Some(dep_resource) = by_binding.get(dep.as_str()) {
                visit(dep_resource, by_binding, visited, path, sorted)?;
            }
        }

        path.pop();
        visited.insert(binding);
        sorted.push(resource.clone());
        Ok(())
    }

    for resource in resources {
        visit(resource, &by_binding, &mut visited, &mut path, &mut sorted)?;
    }

    Ok(sorted)
}

/// Replace the references whose targets are already known
fn resolve_known(resource: &Resource, bindings: &Bindings) -> Resource {
    let mut resolved = resource.clone();
    for value in resolved.attributes.values_mut() {
        *value = resolve_known_value(value, bindings);
    }
    resolved
}

fn resolve_known_value(value: &Value, bindings: &Bindings) -> Value {
    match value {
        Value::ResourceRef(binding, attr) => bindings
            .get(binding)
            .and_then(|attrs| attrs.get(attr))
            .cloned()
            .unwrap_or_else(|| value.clone()),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|v| resolve_known_value(v, bindings))
                .collect(),
        ),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_known_value(v, bindings)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn has_references(resource: &Resource) -> bool {
    resource
        .attributes
        .values()
        .any(|v| !references(v).is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aivenctl_state::BackendConfig;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    fn reference(binding: &str, attr: &str) -> Value {
        Value::ResourceRef(binding.to_string(), attr.to_string())
    }

    #[test]
    fn dependencies_come_first() {
        let resources = vec![
            Resource::new("pg", "db").with_attribute("project_vpc_id", reference("vpc", "id")),
            Resource::new("service_user", "app").with_attribute("service_name", reference("db", "service_name")),
            Resource::new("project_vpc", "vpc").with_attribute("project", s("acme")),
        ];
        let names: Vec<_> = sort_resources_by_dependencies(&resources)
            .unwrap()
            .into_iter()
            .map(|r| r.id.name)
            .collect();
        assert_eq!(names, vec!["vpc", "db", "app"]);
    }

    #[test]
    fn reference_cycles_are_rejected() {
        let resources = vec![
            Resource::new("project_vpc", "vpc").with_attribute("project", s("acme")),
            Resource::new("pg", "a").with_attribute("project_vpc_id", reference("b", "id")),
            Resource::new("pg", "b").with_attribute("project_vpc_id", reference("a", "id")),
        ];
        let err = sort_resources_by_dependencies(&resources).unwrap_err();
        assert_eq!(err, "Dependency cycle: a -> b -> a");
    }

    #[test]
    fn recorded_dependencies_drive_removal_order() {
        let mut state_file = StateFile::new();
        // Recorded in the order an earlier apply happened to finish them
        state_file.upsert_resource(ResourceState::new("service_user", "app", PROVIDER_NAME, "acme/db/app"));
        state_file.upsert_resource(ResourceState::new("pg", "db", PROVIDER_NAME, "acme/db"));
        state_file.upsert_resource(ResourceState::new("project_vpc", "vpc", PROVIDER_NAME, "acme/v-1"));

        let dependencies = HashMap::from([
            (ResourceId::new("service_user", "app"), vec!["db".to_string()]),
            (ResourceId::new("pg", "db"), vec!["vpc".to_string()]),
            (ResourceId::new("project_vpc", "vpc"), Vec::new()),
        ]);
        record_dependencies(&mut state_file, &dependencies);

        let order: Vec<_> = state_file.removal_order().into_iter().map(|r| r.name.as_str()).collect();
        assert_eq!(order, vec!["app", "db", "vpc"]);
    }

    #[test]
    fn unknown_references_stay_pending() {
        let bindings = Bindings::from([(
            "vpc".to_string(),
            HashMap::from([("id".to_string(), s("acme/v-1"))]),
        )]);
        let resource = Resource::new("pg", "db")
            .with_attribute("project_vpc_id", reference("vpc", "id"))
            .with_attribute(
                "tag",
                Value::List(vec![Value::Map(HashMap::from([(
                    "value".to_string(),
                    reference("other", "name"),
                )]))]),
            );

        let resolved = resolve_known(&resource, &bindings);
        assert_eq!(resolved.attributes["project_vpc_id"], s("acme/v-1"));
        assert!(has_references(&resolved));
    }

    #[test]
    fn protected_deletions_are_refused() {
        let id = ResourceId::new("kafka_topic", "events");
        let state = State::existing(
            id.clone(),
            HashMap::from([(TERMINATION_PROTECTION.to_string(), Value::Bool(true))]),
        )
        .with_identifier("acme/kafka-1/events");
        let current = HashMap::from([(id.clone(), state)]);
        let plan = create_plan(
            &[],
            &current,
            &HashMap::new(),
            &[(id, "acme/kafka-1/events".to_string())],
        );

        let err = check_protected(&plan, &current).unwrap_err();
        assert!(err.contains("kafka_topic.events"));
    }

    #[test]
    fn validation_reports_unknown_types_and_missing_inputs() {
        let schemas = Schemas::load();
        let resources = vec![
            Resource::new("ec2_vpc", "main"),
            Resource::new("project", "acme")
                .with_read_only(true)
                .with_attribute("project", s("acme")),
            Resource::new("project_vpc", "vpc").with_attribute("project", s("acme")),
        ];
        let err = validate_resources(&resources, &schemas).unwrap_err();
        assert!(err.contains("unknown resource type 'ec2_vpc'"));
        assert!(err.contains("Required attribute 'cloud_name' is missing"));
        assert!(!err.contains("project.acme"));
    }

    #[test]
    fn outcomes_update_the_state_file() {
        let mut state_file = StateFile::new();
        state_file.upsert_resource(ResourceState::new("pg", "old", PROVIDER_NAME, "acme/pg-0"));

        let created = State::existing(
            ResourceId::new("pg", "db"),
            HashMap::from([("plan".to_string(), s("startup-4"))]),
        )
        .with_identifier("acme/pg-1");
        let result = ApplyResult {
            outcomes: vec![
                (ResourceId::new("pg", "db"), Ok(EffectOutcome::Created { state: created })),
                (ResourceId::new("pg", "old"), Ok(EffectOutcome::Deleted)),
            ],
            success_count: 2,
            failure_count: 0,
        };
        record_outcomes(&mut state_file, &result);

        assert!(state_file.find_resource("pg", "old").is_none());
        assert_eq!(
            state_file.find_resource("pg", "db").unwrap().identifier,
            "acme/pg-1"
        );
    }

    #[tokio::test]
    async fn state_show_requires_an_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aivenctl.state.json");
        let backend =
            LocalBackend::from_config(&BackendConfig::local(path.to_string_lossy())).unwrap();
        let err = run_state_command(
            &StateCommands::Show {
                address: "pg".to_string(),
            },
            &backend,
        )
        .await
        .unwrap_err();
        assert!(err.contains("expected TYPE.NAME"));
    }
}
