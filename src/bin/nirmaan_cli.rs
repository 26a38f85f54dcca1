use std::{path::PathBuf, str::FromStr, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use nirmaan::{
    cache::{CacheBackend, FileCache},
    commands::{
        purchaseorders::{CancelPurchaseOrderCommand, DeletePurchaseOrderCommand, MergeSelection},
        ConfirmationDialog,
    },
    common::format_inr,
    config::{self, AppConfig},
    events::{process_events, Event, EventHandler, EventLogger, EventSender},
    logging::{setup_logger, LoggerConfig},
    models::{Notification, ProcurementOrder},
    notifications::NotificationStore,
    services::{
        downloads::{download, BulkDownload, DownloadRequest},
        totals::po_totals,
    },
    store::{doctypes, frappe::FrappeClient, DocumentStore, DocumentStoreExt, ListQuery, SortOrder},
    workflow::PoDetailAction,
};
use serde::Serialize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Notifications(command) => {
            handle_notifications_command(&context, command, cli.json).await?
        }
        Commands::Po(command) => handle_po_command(&context, command, cli.json).await?,
        Commands::Download(args) => handle_download(&context, args).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "nirmaan", about = "Nirmaan procurement workflows from the terminal", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Notifications(NotificationsCommands),
    #[command(subcommand)]
    Po(PoCommands),
    Download(DownloadArgs),
}

#[derive(Subcommand)]
enum NotificationsCommands {
    List(ListNotificationsArgs),
}

#[derive(Args)]
struct ListNotificationsArgs {
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Replace the cached list with the latest notifications from the server"
    )]
    refresh: bool,
    #[arg(long, default_value_t = 50, help = "How many notifications to fetch on refresh")]
    limit: u32,
}

#[derive(Subcommand)]
enum PoCommands {
    Totals(PoNameArgs),
    Cancel(CancelPoArgs),
    Delete(DeletePoArgs),
    Merge(MergePoArgs),
}

#[derive(Args)]
struct PoNameArgs {
    #[arg(help = "Purchase order name, e.g. PO/2024/00042")]
    name: String,
}

#[derive(Args)]
struct CancelPoArgs {
    #[arg(help = "Purchase order to cancel")]
    name: String,
    #[arg(long, help = "Optional comment stored with the cancellation")]
    comment: Option<String>,
    #[arg(long, action = ArgAction::SetTrue, help = "Confirm the cancellation")]
    confirm: bool,
}

#[derive(Args)]
struct DeletePoArgs {
    #[arg(help = "Purchase order to delete")]
    name: String,
    #[arg(long, action = ArgAction::SetTrue, help = "Confirm the deletion")]
    confirm: bool,
}

#[derive(Args)]
struct MergePoArgs {
    #[arg(help = "Purchase order the others are merged into")]
    name: String,
    #[arg(
        long = "with",
        required = true,
        num_args = 1..,
        help = "Approved POs of the same vendor and project to merge"
    )]
    with: Vec<String>,
    #[arg(long, action = ArgAction::SetTrue, help = "Confirm the merge")]
    confirm: bool,
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(value_parser = parse_download_kind, help = "One of: pos, wos, invoices, dns")]
    kind: BulkDownload,
    #[arg(long, help = "Project whose documents are exported")]
    project: String,
    #[arg(long, action = ArgAction::SetTrue, help = "Include rates (POs and WOs)")]
    with_rate: bool,
    #[arg(long, help = "Output path; defaults to the server's file name")]
    out: Option<PathBuf>,
}

struct CliContext {
    config: AppConfig,
    client: Arc<FrappeClient>,
    store: Arc<dyn DocumentStore>,
    event_sender: Arc<EventSender>,
    notifications: NotificationStore,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let client = Arc::new(FrappeClient::from_config(&config).context("invalid Frappe settings")?);
        let store: Arc<dyn DocumentStore> = client.clone();

        let cache: Arc<dyn CacheBackend> = Arc::new(
            FileCache::open(&config.cache_dir)
                .await
                .context("failed to open local cache")?,
        );
        let logger = setup_logger(LoggerConfig {
            session_id: config.session_id.clone(),
            ..LoggerConfig::default()
        });
        let notifications = NotificationStore::new(
            cache,
            &config.session_id,
            config.seen_decrement,
            logger.clone(),
        );

        let (event_sender, event_rx) = EventSender::<Event>::channel(config.event_channel_capacity);
        tokio::spawn(process_events(
            event_rx,
            vec![Arc::new(EventLogger::new(logger)) as Arc<dyn EventHandler>],
        ));

        Ok(Self {
            config,
            client,
            store,
            event_sender: Arc::new(event_sender),
            notifications,
        })
    }
}

async fn handle_notifications_command(
    context: &CliContext,
    command: NotificationsCommands,
    json: bool,
) -> Result<()> {
    match command {
        NotificationsCommands::List(args) => {
            context.notifications.hydrate().await?;
            if args.refresh {
                let latest: Vec<Notification> = context
                    .store
                    .fetch_list(
                        &ListQuery::new()
                            .order_by("creation", SortOrder::Desc)
                            .limit(args.limit),
                    )
                    .await
                    .context("failed to fetch notifications")?;
                context.notifications.add_all_notific_directly(latest).await;
            }

            let notifications = context.notifications.notifications().await;
            let unseen = context.notifications.notifications_count().await;
            if json {
                print_json(&NotificationListing {
                    unseen,
                    notifications,
                })?;
            } else {
                println!("{} notifications, {} unseen", notifications.len(), unseen);
                for n in &notifications {
                    render_notification(n);
                }
            }
        }
    }
    Ok(())
}

async fn handle_po_command(context: &CliContext, command: PoCommands, json: bool) -> Result<()> {
    match command {
        PoCommands::Totals(args) => {
            let po: ProcurementOrder = context.store.fetch(&args.name).await?;
            let totals = po_totals(&po.order_list.list);
            if json {
                print_json(&serde_json::json!({
                    "name": po.name,
                    "excl_gst": totals.excl_gst,
                    "gst": totals.gst(),
                    "incl_gst": totals.incl_gst,
                }))?;
            } else {
                println!("{} • {} • {}", po.name, po.vendor_name.as_deref().unwrap_or(&po.vendor), po.status);
                println!("  Total (excl. GST): {}", format_inr(totals.excl_gst));
                println!("  GST:               {}", format_inr(totals.gst()));
                println!("  Total (incl. GST): {}", format_inr(totals.incl_gst));
            }
        }
        PoCommands::Cancel(args) => {
            let mut command = CancelPurchaseOrderCommand::new(&args.name);
            if let Some(comment) = args.comment {
                command = command.with_comment(comment);
            }
            let dialog = ConfirmationDialog::open(command);
            if !args.confirm {
                return dry_run(dialog);
            }
            let result = dialog
                .confirm_and_execute(context.store.clone(), context.event_sender.clone())
                .await?;
            println!("{} cancelled; sent back as {}", result.po_name, result.sent_back.name);
            result
                .await_rejected_listing(context.store.as_ref(), &context.config.timeouts)
                .await
                .context("sent-back record did not appear in the Rejected PO list")?;
            println!("Listed in Rejected PO as {}", result.sent_back.suffix);
        }
        PoCommands::Delete(args) => {
            let po: ProcurementOrder = context.store.fetch(&args.name).await?;
            if PoDetailAction::require(&po)? != PoDetailAction::Delete {
                bail!("{} must be cancelled, not deleted", po.name);
            }
            let dialog = ConfirmationDialog::open(DeletePurchaseOrderCommand::new(&args.name));
            if !args.confirm {
                return dry_run(dialog);
            }
            dialog
                .confirm_and_execute(context.store.clone(), context.event_sender.clone())
                .await?;
            println!("{} deleted from {}", args.name, doctypes::PROCUREMENT_ORDERS);
        }
        PoCommands::Merge(args) => {
            let mut selection = MergeSelection::load(
                context.store.as_ref(),
                &args.name,
                context.config.timeouts.clone(),
            )
            .await?;
            for other in &args.with {
                selection.toggle(other)?;
            }
            let first = selection.open_dialog()?;
            let preview = first.preview();
            if json {
                print_json(&serde_json::json!({
                    "sources": preview.sources,
                    "lines": preview.lines,
                    "excl_gst": preview.totals.excl_gst,
                    "incl_gst": preview.totals.incl_gst,
                }))?;
            } else {
                println!("Merging {} into {}", preview.sources.join(", "), args.name);
                for line in &preview.lines {
                    println!(
                        "- {} ({}) × {} @ {}",
                        line.item,
                        line.po.as_deref().unwrap_or("-"),
                        line.quantity,
                        format_inr(line.quote)
                    );
                }
                println!("  Total (incl. GST): {}", format_inr(preview.totals.incl_gst));
            }

            let dialog = first.proceed();
            if !args.confirm {
                return dry_run(dialog);
            }
            let result = dialog
                .confirm_and_execute(context.store.clone(), context.event_sender.clone())
                .await?;
            println!("Merged {} into {}", result.merged.join(", "), result.new_po_name);
        }
    }
    Ok(())
}

async fn handle_download(context: &CliContext, args: DownloadArgs) -> Result<()> {
    let request = DownloadRequest {
        kind: args.kind,
        project: args.project,
        with_rate: args.with_rate,
    };
    let pdf = download(&context.client, &request).await?;
    let path = args.out.unwrap_or_else(|| PathBuf::from(&pdf.file_name));
    tokio::fs::write(&path, &pdf.content)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Saved {} ({} bytes)", path.display(), pdf.content.len());
    Ok(())
}

/// Shows the dialog heading, then closes it without confirming.
fn dry_run<C: nirmaan::commands::Command>(dialog: ConfirmationDialog<C>) -> Result<()> {
    println!("{}", dialog.heading());
    dialog.cancel();
    println!("Not confirmed; nothing was changed. Re-run with --confirm to proceed.");
    Ok(())
}

fn parse_download_kind(value: &str) -> Result<BulkDownload, String> {
    BulkDownload::from_str(value).map_err(|_| format!("unknown download kind '{}'", value))
}

#[derive(Serialize)]
struct NotificationListing {
    unseen: usize,
    notifications: Vec<Notification>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_notification(n: &Notification) {
    println!(
        "- {} {} • {} • {}",
        if n.is_unseen() { "●" } else { " " },
        n.name,
        n.title.as_deref().unwrap_or("(untitled)"),
        n.creation.as_deref().unwrap_or("")
    );
}
