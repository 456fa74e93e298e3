use std::sync::Arc;

use clap::{Parser, Subcommand};

use kaizendw::storage::dir::DirStore;
use kaizendw::storage::memory::MemoryStore;
use kaizendw::storage::sqlite::SqliteStore;
use kaizendw::{
    AggKey, Chart, ChartData, ChartFilters, ChartPatch, CyclePatch, EntityKind, EntityPatch,
    IssuePatch, IssueQuery, IssueStatus, KaizenDW, LongRecord, NewChart, NewCycle, PdcaCycle,
    ReportDigest,
};

#[derive(Parser)]
#[command(name = "kaizendw", about = "PDCA consulting dashboard warehouse CLI")]
struct Cli {
    /// SQLite database path (default: ~/.kaizendw/kaizendw.db)
    #[arg(long)]
    db: Option<String>,

    /// Keep documents as JSON files under this directory instead of SQLite
    #[arg(long, conflicts_with = "db")]
    data_dir: Option<String>,

    /// In-memory storage, discarded on exit
    #[arg(long, conflicts_with_all = ["db", "data_dir"])]
    memory: bool,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage clients
    Client {
        #[command(subcommand)]
        action: ClientAction,
    },
    /// Manage a client's departments and stores
    Entity {
        #[command(subcommand)]
        action: EntityAction,
    },
    /// Manage dashboard charts
    Chart {
        #[command(subcommand)]
        action: ChartAction,
    },
    /// Manage improvement issues
    Issue {
        #[command(subcommand)]
        action: IssueAction,
    },
    /// Record and inspect PDCA cycles
    Cycle {
        #[command(subcommand)]
        action: CycleAction,
    },
    /// Import and inspect metric records
    Data {
        #[command(subcommand)]
        action: DataAction,
    },
    /// Print the meeting report digest for a client
    Report {
        /// Client name
        client: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse status
    Status,
}

#[derive(Subcommand)]
enum ClientAction {
    /// Add a client (no-op if it already exists)
    Add {
        /// Client name
        name: String,
    },
    /// List clients
    List,
}

#[derive(Subcommand)]
enum EntityAction {
    /// Add a department or store
    Add {
        /// Client name
        client: String,
        /// Entity name
        name: String,
        /// Entity kind: department, store
        #[arg(long, default_value = "department")]
        kind: String,
    },
    /// List entities in dashboard order
    List {
        /// Client name
        client: String,
    },
    /// Update an entity
    Update {
        /// Client name
        client: String,
        /// Entity id
        entity_id: String,
        #[arg(long)]
        name: Option<String>,
        /// Entity kind: department, store
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        sort_order: Option<i64>,
    },
    /// Remove an entity
    Remove {
        /// Client name
        client: String,
        /// Entity id
        entity_id: String,
    },
}

#[derive(Subcommand)]
enum ChartAction {
    /// Add a chart
    Add {
        /// Client name
        client: String,
        /// Chart title
        title: String,
        /// Series key to plot (repeatable)
        #[arg(long = "series", value_name = "KEY")]
        series: Vec<String>,
        /// Aggregation: raw, cumulative, yoy_diff, yoy_pct
        #[arg(long, default_value = "raw")]
        agg: String,
        /// Pin the chart to one store, overriding the dashboard selection
        #[arg(long)]
        store: Option<String>,
        /// Chart style hint for the renderer
        #[arg(long, default_value = "bar")]
        chart_type: String,
        /// Show only the last N periods
        #[arg(long)]
        last_n: Option<usize>,
        /// Filter records by department
        #[arg(long)]
        department: Option<String>,
        /// Filter records by category
        #[arg(long)]
        category: Option<String>,
    },
    /// List charts in dashboard order
    List {
        /// Client name
        client: String,
    },
    /// Compute a chart's rows
    Data {
        /// Client name
        client: String,
        /// Chart id
        chart_id: String,
        /// Dashboard store selection (the chart's own override wins)
        #[arg(long)]
        store: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Output as CSV
        #[arg(long)]
        csv: bool,
    },
    /// Update a chart
    Update {
        /// Client name
        client: String,
        /// Chart id
        chart_id: String,
        #[arg(long)]
        title: Option<String>,
        /// Replace the plotted series keys (repeatable)
        #[arg(long = "series", value_name = "KEY")]
        series: Vec<String>,
        /// Aggregation: raw, cumulative, yoy_diff, yoy_pct
        #[arg(long)]
        agg: Option<String>,
        /// Store override; pass an empty string to clear it
        #[arg(long)]
        store: Option<String>,
        #[arg(long)]
        chart_type: Option<String>,
        /// Show or hide the chart on the dashboard
        #[arg(long)]
        show: Option<bool>,
        /// Replace the chart's filters with these
        #[arg(long)]
        last_n: Option<usize>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Reorder charts; unnamed charts keep their order after the named ones
    Reorder {
        /// Client name
        client: String,
        /// Chart ids in the desired order
        ids: Vec<String>,
    },
    /// Remove a chart
    Remove {
        /// Client name
        client: String,
        /// Chart id
        chart_id: String,
    },
}

#[derive(Subcommand)]
enum IssueAction {
    /// Add an issue
    Add {
        /// Client name
        client: String,
        /// Issue title
        title: String,
        /// Entity id to file it under
        #[arg(long)]
        entity: Option<String>,
    },
    /// List issues
    List {
        /// Client name
        client: String,
        /// Filter by status: open, doing, done, paused
        #[arg(long)]
        status: Option<String>,
        /// Everything except done
        #[arg(long)]
        active: bool,
        /// Filter by entity id
        #[arg(long)]
        entity: Option<String>,
        /// Filter by substring of the title
        #[arg(long)]
        contains: Option<String>,
        /// Maximum results
        #[arg(long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Output as CSV
        #[arg(long)]
        csv: bool,
    },
    /// Update an issue
    Update {
        /// Client name
        client: String,
        /// Issue id
        issue_id: String,
        #[arg(long)]
        title: Option<String>,
        /// New status: open, doing, done, paused
        #[arg(long)]
        status: Option<String>,
        /// Entity id; pass an empty string to unassign
        #[arg(long)]
        entity: Option<String>,
    },
    /// Remove an issue and its cycles
    Remove {
        /// Client name
        client: String,
        /// Issue id
        issue_id: String,
    },
}

#[derive(Subcommand)]
enum CycleAction {
    /// Record a cycle against an issue
    Add {
        /// Client name
        client: String,
        /// Issue id
        issue_id: String,
        /// Meeting date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Entity id (defaults to the issue's)
        #[arg(long)]
        entity: Option<String>,
        /// Current situation
        #[arg(long, default_value = "")]
        situation: String,
        /// Problem analysis
        #[arg(long, default_value = "")]
        issue: String,
        /// Action to take; 【...】 markers spawn follow-up issues
        #[arg(long, default_value = "")]
        action: String,
        /// Measurable target
        #[arg(long, default_value = "")]
        target: String,
        /// Status: open, doing, done, paused (defaults to the issue's)
        #[arg(long)]
        status: Option<String>,
    },
    /// List cycles, latest first
    List {
        /// Client name
        client: String,
        /// Filter by issue id
        #[arg(long)]
        issue: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update a cycle; a changed action reruns task reconciliation
    Update {
        /// Client name
        client: String,
        /// Cycle id
        cycle_id: String,
        /// Meeting date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        situation: Option<String>,
        #[arg(long)]
        issue: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        target: Option<String>,
        /// Status: open, doing, done, paused
        #[arg(long)]
        status: Option<String>,
        /// Entity id; pass an empty string to unassign
        #[arg(long)]
        entity: Option<String>,
    },
    /// Show the latest cycle for an issue
    Latest {
        /// Client name
        client: String,
        /// Issue id
        issue_id: String,
    },
    /// Remove a cycle
    Remove {
        /// Client name
        client: String,
        /// Cycle id
        cycle_id: String,
    },
}

#[derive(Subcommand)]
enum DataAction {
    /// Replace a client's records from a JSON file
    Import {
        /// Client name
        client: String,
        /// Path to a JSON array of long-format records
        file: String,
    },
    /// List the columns present in a client's records
    Columns {
        /// Client name
        client: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compute chart rows without saving a chart
    Preview {
        /// Client name
        client: String,
        /// Series key to plot (repeatable; all columns when omitted)
        #[arg(long = "series", value_name = "KEY")]
        series: Vec<String>,
        /// Aggregation: raw, cumulative, yoy_diff, yoy_pct
        #[arg(long, default_value = "raw")]
        agg: String,
        /// Store to compute against
        #[arg(long)]
        store: Option<String>,
        /// Show only the last N periods
        #[arg(long)]
        last_n: Option<usize>,
        /// Filter records by department
        #[arg(long)]
        department: Option<String>,
        /// Filter records by category
        #[arg(long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Output as CSV
        #[arg(long)]
        csv: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let store: kaizendw::SharedStore = if cli.memory {
        Arc::new(MemoryStore::new())
    } else if let Some(ref dir) = cli.data_dir {
        Arc::new(DirStore::open(dir).await?)
    } else if let Some(ref path) = cli.db {
        Arc::new(SqliteStore::open_at(path).await?)
    } else {
        Arc::new(SqliteStore::open().await?)
    };
    let dw = KaizenDW::new(store);

    match cli.command {
        Commands::Client { action } => handle_client(&dw, action).await?,
        Commands::Entity { action } => handle_entity(&dw, action).await?,
        Commands::Chart { action } => handle_chart(&dw, action).await?,
        Commands::Issue { action } => handle_issue(&dw, action).await?,
        Commands::Cycle { action } => handle_cycle(&dw, action).await?,
        Commands::Data { action } => handle_data(&dw, action).await?,
        Commands::Report { client, json } => {
            let client = dw.resolve_client(&client).await?;
            let report = dw.report(&client.id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Config { action } => handle_config(&dw, action).await?,
        Commands::Status => print_status(&dw).await?,
    }

    Ok(())
}

async fn handle_client(dw: &KaizenDW, action: ClientAction) -> anyhow::Result<()> {
    match action {
        ClientAction::Add { name } => {
            let client = dw.ensure_client(&name).await?;
            println!("Added: {} ({})", client.name, client.id);
        }
        ClientAction::List => {
            let clients = dw.list_clients().await?;
            if clients.is_empty() {
                println!("No clients.");
            } else {
                for client in clients {
                    println!("{} ({})", client.name, client.id);
                }
            }
        }
    }
    Ok(())
}

async fn handle_entity(dw: &KaizenDW, action: EntityAction) -> anyhow::Result<()> {
    match action {
        EntityAction::Add { client, name, kind } => {
            let client = dw.resolve_client(&client).await?;
            let kind = EntityKind::parse(&kind)?;
            let entity = dw.create_entity(&client.id, &name, kind).await?;
            println!("Added: {} ({})", entity.name, entity.id);
        }
        EntityAction::List { client } => {
            let client = dw.resolve_client(&client).await?;
            let entities = dw.list_entities(&client.id).await?;
            if entities.is_empty() {
                println!("No entities.");
            } else {
                for e in entities {
                    println!("{}  {:<10} {}", e.id, e.kind.as_str(), e.name);
                }
            }
        }
        EntityAction::Update {
            client,
            entity_id,
            name,
            kind,
            sort_order,
        } => {
            let client = dw.resolve_client(&client).await?;
            let patch = EntityPatch {
                name,
                kind: kind.as_deref().map(EntityKind::parse).transpose()?,
                sort_order,
            };
            let entity = dw.update_entity(&client.id, &entity_id, patch).await?;
            println!("Updated: {} ({})", entity.name, entity.id);
        }
        EntityAction::Remove { client, entity_id } => {
            let client = dw.resolve_client(&client).await?;
            dw.delete_entity(&client.id, &entity_id).await?;
            println!("Removed: {entity_id}");
        }
    }
    Ok(())
}

async fn handle_chart(dw: &KaizenDW, action: ChartAction) -> anyhow::Result<()> {
    match action {
        ChartAction::Add {
            client,
            title,
            series,
            agg,
            store,
            chart_type,
            last_n,
            department,
            category,
        } => {
            let client = dw.resolve_client(&client).await?;
            let mut new = NewChart::titled(&title);
            new.series_keys = series;
            new.agg_key = AggKey::parse(&agg)?;
            new.store_override = store.filter(|s| !s.is_empty());
            new.chart_type = chart_type;
            new.filters = ChartFilters {
                last_n,
                department,
                category,
            };
            let chart = dw.create_chart(&client.id, new).await?;
            println!("Added: {} ({})", chart.title, chart.id);
        }
        ChartAction::List { client } => {
            let client = dw.resolve_client(&client).await?;
            let charts = dw.list_charts(&client.id).await?;
            if charts.is_empty() {
                println!("No charts.");
            } else {
                for chart in charts {
                    let hidden = if chart.show_on_dashboard {
                        ""
                    } else {
                        " (hidden)"
                    };
                    println!(
                        "{}  [{}] {} ({}){}",
                        chart.id,
                        chart.sort_order,
                        chart.title,
                        chart.agg_key.as_str(),
                        hidden
                    );
                }
            }
        }
        ChartAction::Data {
            client,
            chart_id,
            store,
            json,
            csv,
        } => {
            let client = dw.resolve_client(&client).await?;
            let data = dw
                .chart_data(&client.id, &chart_id, store.as_deref())
                .await?;
            print_chart_data(&data, json, csv)?;
        }
        ChartAction::Update {
            client,
            chart_id,
            title,
            series,
            agg,
            store,
            chart_type,
            show,
            last_n,
            department,
            category,
        } => {
            let client = dw.resolve_client(&client).await?;
            let filters = (last_n.is_some() || department.is_some() || category.is_some())
                .then_some(ChartFilters {
                    last_n,
                    department,
                    category,
                });
            let patch = ChartPatch {
                title,
                chart_type,
                series_keys: (!series.is_empty()).then_some(series),
                agg_key: agg.as_deref().map(AggKey::parse).transpose()?,
                store_override: store,
                filters,
                show_on_dashboard: show,
                ..Default::default()
            };
            let chart = dw.update_chart(&client.id, &chart_id, patch).await?;
            println!("Updated: {} ({})", chart.title, chart.id);
        }
        ChartAction::Reorder { client, ids } => {
            let client = dw.resolve_client(&client).await?;
            let charts = dw.reorder_charts(&client.id, &ids).await?;
            for chart in charts {
                println!("[{}] {}", chart.sort_order, chart.title);
            }
        }
        ChartAction::Remove { client, chart_id } => {
            let client = dw.resolve_client(&client).await?;
            dw.delete_chart(&client.id, &chart_id).await?;
            println!("Removed: {chart_id}");
        }
    }
    Ok(())
}

async fn handle_issue(dw: &KaizenDW, action: IssueAction) -> anyhow::Result<()> {
    match action {
        IssueAction::Add {
            client,
            title,
            entity,
        } => {
            let client = dw.resolve_client(&client).await?;
            let issue = dw.create_issue(&client.id, &title, entity).await?;
            println!("Added: {} ({})", issue.title, issue.id);
        }
        IssueAction::List {
            client,
            status,
            active,
            entity,
            contains,
            limit,
            json,
            csv,
        } => {
            let client = dw.resolve_client(&client).await?;
            let mut query = IssueQuery::new();
            if let Some(ref s) = status {
                query = query.status(IssueStatus::parse(s)?);
            }
            if active {
                query = query.active_only();
            }
            if let Some(ref e) = entity {
                query = query.entity(e);
            }
            if let Some(ref needle) = contains {
                query = query.title_contains(needle);
            }
            if let Some(n) = limit {
                query = query.limit(n);
            }
            let issues = dw.list_issues(&client.id, &query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&issues)?);
            } else if csv {
                print!("{}", kaizendw::query::issues_to_csv(&issues));
            } else if issues.is_empty() {
                println!("No issues found.");
            } else {
                for issue in &issues {
                    let entity = issue
                        .entity_id
                        .as_deref()
                        .map(|e| format!(" | entity: {e}"))
                        .unwrap_or_default();
                    println!(
                        "[{}] {} ({}){}",
                        issue.status.as_str(),
                        issue.title,
                        issue.id,
                        entity
                    );
                }
                println!("\n{} issues", issues.len());
            }
        }
        IssueAction::Update {
            client,
            issue_id,
            title,
            status,
            entity,
        } => {
            let client = dw.resolve_client(&client).await?;
            let patch = IssuePatch {
                title,
                status: status.as_deref().map(IssueStatus::parse).transpose()?,
                entity_id: entity,
            };
            let issue = dw.update_issue(&client.id, &issue_id, patch).await?;
            println!("Updated: [{}] {}", issue.status.as_str(), issue.title);
        }
        IssueAction::Remove { client, issue_id } => {
            let client = dw.resolve_client(&client).await?;
            dw.delete_issue(&client.id, &issue_id).await?;
            println!("Removed: {issue_id}");
        }
    }
    Ok(())
}

async fn handle_cycle(dw: &KaizenDW, action: CycleAction) -> anyhow::Result<()> {
    match action {
        CycleAction::Add {
            client,
            issue_id,
            date,
            entity,
            situation,
            issue,
            action,
            target,
            status,
        } => {
            let client = dw.resolve_client(&client).await?;
            let new = NewCycle {
                issue_id,
                entity_id: entity,
                cycle_date: date,
                situation,
                issue,
                action,
                target,
                status: status.as_deref().map(IssueStatus::parse).transpose()?,
            };
            let outcome = dw.create_cycle(&client.id, new).await?;
            println!("Recorded cycle {} ({})", outcome.cycle.id, outcome.cycle.cycle_date);
            if !outcome.created_issues.is_empty() {
                println!("Spawned {} follow-up issues:", outcome.created_issues.len());
                for issue in &outcome.created_issues {
                    println!("  {} ({})", issue.title, issue.id);
                }
            }
        }
        CycleAction::List {
            client,
            issue,
            json,
        } => {
            let client = dw.resolve_client(&client).await?;
            let cycles = dw.list_cycles(&client.id, issue.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&cycles)?);
            } else if cycles.is_empty() {
                println!("No cycles recorded.");
            } else {
                for cycle in &cycles {
                    println!(
                        "{}  [{}] {} (issue: {})",
                        cycle.cycle_date,
                        cycle.status.as_str(),
                        cycle.id,
                        cycle.issue_id
                    );
                }
            }
        }
        CycleAction::Update {
            client,
            cycle_id,
            date,
            situation,
            issue,
            action,
            target,
            status,
            entity,
        } => {
            let client = dw.resolve_client(&client).await?;
            let patch = CyclePatch {
                cycle_date: date,
                situation,
                issue,
                action,
                target,
                status: status.as_deref().map(IssueStatus::parse).transpose()?,
                entity_id: entity,
            };
            let outcome = dw.update_cycle(&client.id, &cycle_id, patch).await?;
            println!("Updated cycle {} ({})", outcome.cycle.id, outcome.cycle.cycle_date);
            if !outcome.created_issues.is_empty() {
                println!("Spawned {} follow-up issues:", outcome.created_issues.len());
                for issue in &outcome.created_issues {
                    println!("  {} ({})", issue.title, issue.id);
                }
            }
        }
        CycleAction::Latest { client, issue_id } => {
            let client = dw.resolve_client(&client).await?;
            match dw.latest_cycle(&client.id, &issue_id).await? {
                Some(cycle) => print_cycle(&cycle),
                None => println!("No cycles recorded for this issue."),
            }
        }
        CycleAction::Remove { client, cycle_id } => {
            let client = dw.resolve_client(&client).await?;
            dw.delete_cycle(&client.id, &cycle_id).await?;
            println!("Removed: {cycle_id}");
        }
    }
    Ok(())
}

async fn handle_data(dw: &KaizenDW, action: DataAction) -> anyhow::Result<()> {
    match action {
        DataAction::Import { client, file } => {
            let client = dw.resolve_client(&client).await?;
            let text = std::fs::read_to_string(&file)?;
            let records: Vec<LongRecord> = serde_json::from_str(&text)?;
            let count = dw.replace_records(&client.id, records).await?;
            println!("Imported {count} records.");
        }
        DataAction::Columns { client, json } => {
            let client = dw.resolve_client(&client).await?;
            let columns = dw.list_columns(&client.id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&columns)?);
            } else if columns.is_empty() {
                println!("No records imported yet.");
            } else {
                println!("{:<28} {:<8} {}", "column", "type", "unit");
                for col in &columns {
                    println!(
                        "{:<28} {:<8} {}",
                        col.name,
                        col.column_type.as_str(),
                        col.unit
                    );
                }
            }
        }
        DataAction::Preview {
            client,
            series,
            agg,
            store,
            last_n,
            department,
            category,
            json,
            csv,
        } => {
            let client = dw.resolve_client(&client).await?;
            let mut new = NewChart::titled("preview");
            new.series_keys = series;
            new.agg_key = AggKey::parse(&agg)?;
            new.store_override = store.filter(|s| !s.is_empty());
            new.filters = ChartFilters {
                last_n,
                department,
                category,
            };
            let chart: Chart = new.into_chart(0);
            let data = dw.preview_data(&client.id, &chart, None).await?;
            print_chart_data(&data, json, csv)?;
        }
    }
    Ok(())
}

async fn handle_config(dw: &KaizenDW, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match dw.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            dw.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = dw.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(dw: &KaizenDW) -> anyhow::Result<()> {
    let statuses = dw.status().await?;
    println!("Warehouse Status");
    if statuses.is_empty() {
        println!("  No clients yet.");
        return Ok(());
    }
    for s in statuses {
        println!("  {}:", s.client.name);
        println!("    Entities: {}", s.entities);
        println!("    Charts:   {}", s.charts);
        println!("    Issues:   {}", s.issues);
        println!("    Cycles:   {}", s.cycles);
        println!("    Records:  {}", s.records);
    }
    Ok(())
}

fn print_chart_data(data: &ChartData, json: bool, csv: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(data)?);
    } else if csv {
        print!("{}", chart_data_to_csv(data));
    } else if data.rows.is_empty() {
        println!("No rows.");
    } else {
        for row in &data.rows {
            let cells: Vec<String> = data
                .columns
                .iter()
                .map(|col| match row.value(col) {
                    Some(v) => format!("{col}={v}"),
                    None => format!("{col}=-"),
                })
                .collect();
            println!("{}  {}", row.period, cells.join("  "));
        }
        println!("\n{} rows", data.rows.len());
    }
    Ok(())
}

fn chart_data_to_csv(data: &ChartData) -> String {
    let mut out = String::from("period");
    for col in &data.columns {
        out.push(',');
        out.push_str(&kaizendw::query::csv_escape(col));
    }
    out.push('\n');
    for row in &data.rows {
        out.push_str(&row.period);
        for col in &data.columns {
            out.push(',');
            if let Some(v) = row.value(col) {
                out.push_str(&v.to_string());
            }
        }
        out.push('\n');
    }
    out
}

fn print_cycle(cycle: &PdcaCycle) {
    println!("Cycle {} ({})", cycle.id, cycle.cycle_date);
    println!("  Status:    {}", cycle.status.as_str());
    if !cycle.situation.is_empty() {
        println!("  Situation: {}", cycle.situation);
    }
    if !cycle.issue.is_empty() {
        println!("  Issue:     {}", cycle.issue);
    }
    if !cycle.action.is_empty() {
        println!("  Action:    {}", cycle.action);
    }
    if !cycle.target.is_empty() {
        println!("  Target:    {}", cycle.target);
    }
}

fn print_report(report: &ReportDigest) {
    if report.sections.is_empty() {
        println!("No active issues.");
        return;
    }
    for section in &report.sections {
        match &section.entity {
            Some(entity) => println!("# {}", entity.name),
            None => println!("# (unassigned)"),
        }
        for item in &section.issues {
            println!("- [{}] {}", item.issue.status.as_str(), item.issue.title);
            if let Some(ref cycle) = item.latest_cycle {
                println!("    Last cycle: {}", cycle.cycle_date);
                if !cycle.situation.is_empty() {
                    println!("    Situation:  {}", cycle.situation);
                }
                if !cycle.action.is_empty() {
                    println!("    Action:     {}", cycle.action);
                }
                if !cycle.target.is_empty() {
                    println!("    Target:     {}", cycle.target);
                }
            }
        }
        println!();
    }
}
