use clap::{Parser, Subcommand};
use std::sync::Arc;

mod application;
mod domain;
mod infrastructure;

use application::errors::{CommandError, PluginError};
use application::messaging::MessageParser;
use application::services::{CommandService, LifecycleService};
use domain::entities::{Content, User};
use domain::traits::{Bot, KeyboardButton};
use infrastructure::adapters::console::ConsoleAdapter;
use infrastructure::adapters::telegram::{self, TelegramAdapter};
use infrastructure::artifacts::ArtifactStore;
use infrastructure::config::Config;
use infrastructure::deps::DependencyInstaller;
use infrastructure::plugins::{CapabilityRegistry, PluginLoader};

/// Exit code the supervisor treats as a restart request: the process quits
/// cleanly and an external supervisor relaunches it.
const RESTART_EXIT_CODE: i32 = 75;

const OWNER_ONLY_MESSAGE: &str = "This command is restricted to the bot owner.";

#[derive(Parser)]
#[command(name = "tessera-bot")]
#[command(about = "A group management bot with owner-managed runtime plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            run_bot(cli.config, cli.token);
        }
        Commands::Version => {
            println!("tessera-bot v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config();
        }
    }
}

fn init_config() {
    let config = Config::default();
    match serde_yaml::to_string(&config) {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
        }
        Err(e) => eprintln!("Failed to render default config: {}", e),
    }
}

fn init_logging(config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    // optional file layer so /log has something to ship back to the owner
    let file_layer = config.logging.file.as_ref().and_then(|path| {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            ),
            Err(e) => {
                eprintln!("Failed to open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();
}

/// Everything a message handler needs, wired once at startup
struct App {
    config: Config,
    commands: CommandService,
    lifecycle: LifecycleService,
    parser: MessageParser,
}

impl App {
    fn registry(&self) -> &Arc<CapabilityRegistry> {
        self.lifecycle.registry()
    }

    fn is_owner(&self, sender_id: Option<&str>) -> bool {
        match sender_id {
            Some(id) => self.config.is_owner(id),
            None => false,
        }
    }
}

fn run_bot(config_path: String, token_override: Option<String>) {
    let config = if std::path::Path::new(&config_path).exists() {
        match Config::load(&config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}, falling back to environment", config_path, e);
                Config::load_env()
            }
        }
    } else {
        Config::load_env()
    };

    init_logging(&config);
    tracing::info!("Starting {}", config.bot.name);

    let rt = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    rt.block_on(async {
        let store = ArtifactStore::new(
            &config.plugins.directory,
            &config.plugins.artifact_extension,
            &config.plugins.manifest_extension,
        );
        if let Err(e) = store.init().await {
            tracing::error!("Could not create plugin directory: {}", e);
            return;
        }

        let registry = Arc::new(CapabilityRegistry::new());
        let lifecycle = LifecycleService::new(
            store,
            DependencyInstaller::from_config(&config.installer),
            PluginLoader::dylib(),
            registry,
        );

        if config.plugins.auto_load {
            let count = lifecycle.load_installed().await;
            tracing::info!("Loaded {} installed plugins", count);
        }

        let mut commands = CommandService::new(&config.bot.prefix)
            .with_owner(config.owner.id.clone());
        commands.register_defaults();

        let parser = MessageParser::new(&config.bot.prefix);
        let app = App {
            config,
            commands,
            lifecycle,
            parser,
        };

        let token = token_override.or_else(|| {
            app.config.adapters.telegram.as_ref().and_then(|t| {
                if t.enabled { t.token.clone() } else { None }
            })
        });

        if let Some(token) = token {
            let mut bot = TelegramAdapter::new(token);
            if let Err(e) = bot.register_commands().await {
                tracing::warn!("Failed to register commands: {}", e);
            }
            run_telegram_bot(&mut bot, &app).await;
        } else {
            let bot = ConsoleAdapter::new();
            run_console_bot(bot, &app).await;
        }
    });
}

async fn run_telegram_bot(bot: &mut TelegramAdapter, app: &App) {
    if let Err(e) = bot.fetch_bot_info().await {
        tracing::error!("Failed to fetch bot info: {}", e);
        return;
    }

    let info = bot.bot_info();
    tracing::info!("Bot started: @{}", info.username);

    if app.config.owner.notify_on_start && !app.config.owner.id.is_empty() {
        if let Err(e) = bot.send_message(&app.config.owner.id, "Bot has started successfully!").await {
            tracing::warn!("Could not notify owner: {}", e);
        }
    }

    let mut offset: i64 = 0;
    let timeout_seconds = 30;

    tracing::info!("Starting message loop...");

    loop {
        match bot.get_updates(offset, timeout_seconds).await {
            Ok(updates) => {
                for update in &updates {
                    if let Some(msg) = &update.message {
                        handle_telegram_message(bot, app, msg).await;
                    }
                    if let Some(cb) = &update.callback_query {
                        handle_help_callback(bot, app, cb).await;
                    }
                }
                offset = TelegramAdapter::get_next_offset(&updates).max(offset);
            }
            Err(e) => {
                tracing::error!("Failed to get updates: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        }
    }
}

fn to_domain_user(user: &telegram::User) -> User {
    let mut domain_user = User::new(user.id.to_string());
    if let Some(username) = &user.username {
        domain_user = domain_user.with_username(username.clone());
    }
    if let Some(first) = &user.first_name {
        domain_user = domain_user.with_first_name(first.clone());
    }
    domain_user
}

async fn handle_telegram_message(bot: &TelegramAdapter, app: &App, msg: &telegram::Message) {
    let chat_id = msg.chat.id.to_string();
    // a message carrying a document has its command in the caption
    let Some(text) = msg.text.as_ref().or(msg.caption.as_ref()) else {
        return;
    };
    let text = text.trim();
    if text.is_empty() {
        return;
    }

    // group management bot: anything that is not a command is ignored
    if !(text.starts_with('/') || text.starts_with(app.commands.prefix())) {
        return;
    }

    let sender = msg.from.as_ref().map(to_domain_user);
    let parsed = app.parser.parse(&chat_id, text, sender).with_platform("telegram");
    let Content::Command { name, args } = parsed.content.clone() else {
        return;
    };

    let response = match name.as_str() {
        "install" => Some(handle_install(bot, app, parsed.sender_id(), msg).await),
        "uninstall" => Some(handle_uninstall(app, parsed.sender_id(), &args).await),
        "export" => {
            handle_export(bot, app, &chat_id, parsed.sender_id()).await;
            None
        }
        "log" => {
            handle_log(bot, app, &chat_id, parsed.sender_id()).await;
            None
        }
        "restart" => {
            handle_restart(bot, app, &chat_id, parsed.sender_id()).await;
            None
        }
        "leave" => Some(handle_leave(bot, app, parsed.sender_id(), &args).await),
        "help" => {
            send_help_menu(bot, app, &chat_id).await;
            None
        }
        _ => dispatch_command(app, &parsed, &name, &args),
    };

    if let Some(response) = response {
        let preview: String = response.chars().take(100).collect();
        tracing::info!("Replying to chat {}: {}", chat_id, preview);
        if let Err(e) = bot.send_message(&chat_id, &response).await {
            tracing::error!("Failed to send message: {}", e);
        }
    }
}

/// Static commands first, then commands contributed by loaded plugins.
fn dispatch_command(app: &App, parsed: &domain::entities::Message, name: &str, args: &[String]) -> Option<String> {
    match app.commands.handle(parsed) {
        Ok(response) => response,
        Err(CommandError::PermissionDenied) => Some(OWNER_ONLY_MESSAGE.to_string()),
        Err(CommandError::NotFound(_)) => match app.registry().find_command(name) {
            Some(record) => match record.module.execute(name, args) {
                Ok(output) => Some(output),
                Err(e) => Some(format!("Plugin error: {}", e)),
            },
            None => Some(format!("Unknown command: /{}", name)),
        },
        Err(e) => Some(format!("Error: {}", e)),
    }
}

async fn handle_install(
    bot: &TelegramAdapter,
    app: &App,
    sender_id: Option<&str>,
    msg: &telegram::Message,
) -> String {
    if !app.is_owner(sender_id) {
        return OWNER_ONLY_MESSAGE.to_string();
    }

    let Some(reply) = &msg.reply_to_message else {
        return "Please reply to an uploaded plugin file to install.".to_string();
    };
    let Some(doc) = &reply.document else {
        return "Please reply to an uploaded plugin file to install.".to_string();
    };
    let Some(file_name) = doc.file_name.clone() else {
        return "The uploaded file has no name.".to_string();
    };

    let bytes = match bot.download_file(&doc.file_id).await {
        Ok(bytes) => bytes,
        Err(e) => return format!("Failed to download {}: {}", file_name, e),
    };

    // a manifest document attached to the /install message itself is
    // saved alongside the artifact
    let manifest = match &msg.document {
        Some(manifest_doc) => match bot.download_file(&manifest_doc.file_id).await {
            Ok(bytes) => Some(bytes),
            Err(e) => return format!("Failed to download dependency manifest: {}", e),
        },
        None => None,
    };

    match app.lifecycle.install(&file_name, &bytes, manifest.as_deref()).await {
        Ok(record) => format!("Plugin {} installed successfully!", record.name),
        Err(e) => format!("Failed to install {}: {}", file_name, e),
    }
}

async fn handle_uninstall(app: &App, sender_id: Option<&str>, args: &[String]) -> String {
    if !app.is_owner(sender_id) {
        return OWNER_ONLY_MESSAGE.to_string();
    }

    let Some(name) = args.first() else {
        return "Please provide the plugin name to uninstall.".to_string();
    };

    match app.lifecycle.uninstall(name).await {
        Ok(()) => format!("Plugin {} uninstalled.", name),
        Err(PluginError::NotFound(_)) => format!("Plugin {} not found.", name),
        Err(e) => format!("Failed to uninstall {}: {}", name, e),
    }
}

async fn handle_export<B: Bot>(bot: &B, app: &App, chat_id: &str, sender_id: Option<&str>) {
    if !app.is_owner(sender_id) {
        let _ = bot.send_message(chat_id, OWNER_ONLY_MESSAGE).await;
        return;
    }

    let items = match app.lifecycle.export().await {
        Ok(items) => items,
        Err(e) => {
            let _ = bot.send_message(chat_id, &format!("Export failed: {}", e)).await;
            return;
        }
    };

    if items.is_empty() {
        let _ = bot.send_message(chat_id, "No plugins installed.").await;
        return;
    }

    // best effort: one unreadable artifact does not stop the rest
    for item in items {
        let file_name = format!("{}.{}", item.name, app.config.plugins.artifact_extension);
        match item.result {
            Ok(bytes) => {
                if let Err(e) = bot.send_document(chat_id, &file_name, bytes).await {
                    tracing::warn!("Could not export {}: {}", item.name, e);
                    let _ = bot.send_message(chat_id, &format!("Could not export {}: {}", item.name, e)).await;
                }
            }
            Err(e) => {
                let _ = bot.send_message(chat_id, &format!("Could not export {}: {}", item.name, e)).await;
            }
        }
    }
}

async fn handle_log<B: Bot>(bot: &B, app: &App, chat_id: &str, sender_id: Option<&str>) {
    if !app.is_owner(sender_id) {
        let _ = bot.send_message(chat_id, OWNER_ONLY_MESSAGE).await;
        return;
    }

    let Some(path) = &app.config.logging.file else {
        let _ = bot.send_message(chat_id, "Log file is not configured.").await;
        return;
    };

    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "bot.log".to_string());
            if let Err(e) = bot.send_document(chat_id, &file_name, bytes).await {
                let _ = bot.send_message(chat_id, &format!("Could not send log file: {}", e)).await;
            }
        }
        Err(e) => {
            let _ = bot.send_message(chat_id, &format!("Could not read log file: {}", e)).await;
        }
    }
}

async fn handle_restart<B: Bot>(bot: &B, app: &App, chat_id: &str, sender_id: Option<&str>) {
    if !app.is_owner(sender_id) {
        let _ = bot.send_message(chat_id, OWNER_ONLY_MESSAGE).await;
        return;
    }

    let _ = bot.send_message(chat_id, "Bot restarting...").await;
    tracing::info!("Exiting with code {} for supervisor restart", RESTART_EXIT_CODE);
    std::process::exit(RESTART_EXIT_CODE);
}

async fn handle_leave<B: Bot>(bot: &B, app: &App, sender_id: Option<&str>, args: &[String]) -> String {
    if !app.is_owner(sender_id) {
        return OWNER_ONLY_MESSAGE.to_string();
    }

    let Some(chat) = args.first() else {
        return "Usage: /leave <chat_id>".to_string();
    };

    match bot.leave_chat(chat).await {
        Ok(()) => format!("Left chat {}.", chat),
        Err(e) => format!("Could not leave chat {}: {}", chat, e),
    }
}

/// Interactive help: one button per registered plugin category, in
/// registration order.
async fn send_help_menu<B: Bot>(bot: &B, app: &App, chat_id: &str) {
    let categories = app.registry().categories();
    if categories.is_empty() {
        let _ = bot.send_message(chat_id, &app.commands.get_help(None)).await;
        return;
    }

    let buttons: Vec<Vec<KeyboardButton>> = categories
        .into_iter()
        .map(|category| vec![KeyboardButton::new(&category).with_callback(category)])
        .collect();

    if let Err(e) = bot.send_with_keyboard(chat_id, "Choose a category:", buttons).await {
        tracing::error!("Failed to send help menu: {}", e);
    }
}

async fn handle_help_callback(bot: &TelegramAdapter, app: &App, cb: &telegram::CallbackQuery) {
    let _ = bot.answer_callback(&cb.id, None).await;

    let Some(data) = &cb.data else {
        return;
    };
    let chat_id = cb
        .message
        .as_ref()
        .map(|m| m.chat.id.to_string())
        .unwrap_or_else(|| cb.from.id.to_string());

    // render_help never fails; unknown categories get the fixed fallback
    let help_text = app.registry().render_help(data);
    if let Err(e) = bot.send_message(&chat_id, &help_text).await {
        tracing::error!("Failed to send help text: {}", e);
    }
}

async fn run_console_bot(bot: ConsoleAdapter, app: &App) {
    if let Err(e) = bot.start().await {
        tracing::error!("Failed to start bot: {}", e);
        return;
    }

    let info = bot.bot_info();
    tracing::info!("Bot started: @{}", info.username);

    // the local operator is the owner
    let sender = if app.config.owner.id.is_empty() {
        None
    } else {
        Some(User::new(app.config.owner.id.clone()))
    };

    loop {
        let Some(input) = bot.read_line("> ").await else {
            break;
        };
        if input.is_empty() {
            continue;
        }

        if !(input.starts_with('/') || input.starts_with(app.commands.prefix())) {
            let _ = bot.send_message("console", &format!("Echo: {}", input)).await;
            continue;
        }

        let parsed = app.parser.parse("console", input.as_str(), sender.clone()).with_platform("console");
        let Content::Command { name, args } = parsed.content.clone() else {
            continue;
        };

        match name.as_str() {
            "install" => {
                let _ = bot
                    .send_message("console", "Plugin install needs a file upload; use the Telegram adapter.")
                    .await;
            }
            "uninstall" => {
                let response = handle_uninstall(app, parsed.sender_id(), &args).await;
                let _ = bot.send_message("console", &response).await;
            }
            "export" => handle_export(&bot, app, "console", parsed.sender_id()).await,
            "log" => handle_log(&bot, app, "console", parsed.sender_id()).await,
            "restart" => handle_restart(&bot, app, "console", parsed.sender_id()).await,
            "leave" => {
                let response = handle_leave(&bot, app, parsed.sender_id(), &args).await;
                let _ = bot.send_message("console", &response).await;
            }
            "help" => send_help_menu(&bot, app, "console").await,
            _ => {
                if let Some(response) = dispatch_command(app, &parsed, &name, &args) {
                    let _ = bot.send_message("console", &response).await;
                }
            }
        }
    }
}
