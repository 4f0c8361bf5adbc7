// Engagement platform CLI
// Operator surface over the client library: auth, sessions, live channels and reports

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use engagement_client::error::{ClientError, Result};
use engagement_client::models::{Engagement, ExportFormat, NotificationQuery, Session, StatsUpdate};
use engagement_client::session::{ClassroomState, Delivery, SessionState, StudentSession, TeacherSession};
use engagement_client::{ApiClient, Config, TokenStore};

#[derive(Parser)]
#[command(name = "engage-cli")]
#[command(about = "Classroom engagement client", long_about = None)]
struct Cli {
    /// Backend URL (default: API_BASE_URL or http://localhost:8000)
    #[arg(short, long)]
    api: Option<String>,

    /// WebSocket base URL (default: derived from the backend URL)
    #[arg(long)]
    ws: Option<String>,

    /// Credentials file (default: STORAGE_PATH)
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check backend health
    Health,

    /// Sign in and store the access token
    Login {
        email: String,

        /// Prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Forget the stored credentials
    Logout,

    /// Show the signed-in user
    Me,

    /// List the active and past sessions of the signed-in student
    Sessions,

    /// Join a session by its code
    Join {
        code: String,

        /// Stay connected and print live updates
        #[arg(short, long)]
        watch: bool,
    },

    /// Leave a session
    Leave { session_id: String },

    /// Follow the active session until Ctrl+C
    Watch,

    /// Report engagement for the active session
    Engage {
        #[arg(short, long)]
        engagement: Option<Engagement>,

        /// Focus level, 0-100
        #[arg(short, long)]
        focus: Option<u8>,

        #[arg(long)]
        emotion: Option<String>,
    },

    /// Teacher session management
    Teacher {
        #[command(subcommand)]
        action: TeacherCommand,
    },

    /// List notifications
    Notifications {
        #[arg(short, long)]
        unread: bool,

        #[arg(long)]
        mark_all_read: bool,
    },

    /// Download a session report
    Export {
        session_id: String,

        /// json, csv or pdf
        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,

        /// Output path (default: name suggested by the backend)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Platform statistics (admin only)
    Stats,

    /// Show the video service configuration
    Video,
}

#[derive(Subcommand)]
enum TeacherCommand {
    /// Create a new session
    Create {
        subject: String,

        #[arg(short, long, default_value_t = 30)]
        max_students: u32,
    },

    /// Start a session and monitor it
    Start { session_id: String },

    /// End the active session
    End,

    /// Monitor the active session until Ctrl+C
    Monitor,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    if let Err(e) = run(cli).await {
        println!("{} {}", "✗".red(), e.user_message());
        if e.is_unauthorized() {
            println!("  Run {} first", "engage-cli login <email>".cyan());
        }
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(api) = &cli.api {
        config = config.with_api_base_url(api);
    }
    if let Some(ws) = &cli.ws {
        config.realtime.ws_base_url = ws.trim_end_matches('/').to_string();
    }
    if let Some(path) = &cli.storage {
        config.storage_path = path.clone();
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let tokens = TokenStore::open_file(config.storage_path.clone())?;
    let api = ApiClient::new(&config.api, tokens)?;

    match cli.command {
        Commands::Health => check_health(&api).await,
        Commands::Login { email, password } => login(&api, &email, password).await,
        Commands::Logout => {
            api.logout()?;
            println!("{} Signed out", "✓".green());
            Ok(())
        }
        Commands::Me => show_me(&api).await,
        Commands::Sessions => list_sessions(&api, &config).await,
        Commands::Join { code, watch } => join(&api, &config, &code, watch).await,
        Commands::Leave { session_id } => {
            let student = StudentSession::for_signed_in_user(api, config.realtime.clone()).await?;
            student.leave_session(&session_id).await?;
            println!("{} Left session {}", "✓".green(), session_id);
            Ok(())
        }
        Commands::Watch => watch_active(&api, &config).await,
        Commands::Engage {
            engagement,
            focus,
            emotion,
        } => {
            let update = StatsUpdate {
                engagement,
                focus_level: focus,
                emotion,
                ..Default::default()
            };
            engage(&api, &config, update).await
        }
        Commands::Teacher { action } => teacher(&api, &config, action).await,
        Commands::Notifications {
            unread,
            mark_all_read,
        } => notifications(&api, unread, mark_all_read).await,
        Commands::Export {
            session_id,
            format,
            output,
        } => export(&api, &session_id, format, output).await,
        Commands::Stats => admin_stats(&api).await,
        Commands::Video => {
            let video = api.video_config().await?;
            let status = if video.available {
                "available".green()
            } else {
                "unavailable".yellow()
            };
            println!("Video service: {} ({})", status, video.status);
            if let Some(app_id) = video.app_id {
                println!("  App ID: {}", app_id);
            }
            Ok(())
        }
    }
}

async fn check_health(api: &ApiClient) -> Result<()> {
    println!("{}", "Checking backend health...".cyan());
    let body = api.health().await?;
    println!("{} Health check passed", "✓".green());
    println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("  URL: {}", api.base_url());

    match api.emotion_service_health().await {
        Ok(emotion) => println!("  Emotion service: {}", emotion["status"].as_str().unwrap_or("unknown")),
        Err(e) if e.is_unauthorized() => {}
        Err(e) => println!("  Emotion service: {} {}", "✗".red(), e.user_message()),
    }
    Ok(())
}

async fn login(api: &ApiClient, email: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => prompt("Password: ")?,
    };

    let auth = api.login(email, &password).await?;
    println!("{} Signed in as {} ({})", "✓".green(), auth.user.name.bold(), auth.user.role);
    Ok(())
}

async fn show_me(api: &ApiClient) -> Result<()> {
    let user = api.me().await?;
    println!("{}", user.name.bold());
    println!("  ID: {}", user.id);
    println!("  Email: {}", user.email);
    println!("  Role: {}", user.role);
    if let Some(department) = &user.department {
        println!("  Department: {}", department);
    }

    let unread = api.unread_count().await?;
    if unread > 0 {
        println!("  {} unread notification(s)", unread.to_string().yellow());
    }
    Ok(())
}

async fn list_sessions(api: &ApiClient, config: &Config) -> Result<()> {
    let student = StudentSession::for_signed_in_user(api.clone(), config.realtime.clone()).await?;
    // Listing only; the realtime channel is not needed
    let active = student.load_active_session().await?;
    student.close().await;
    let past = student.load_past_sessions().await?;

    println!("\n{}", "Active".bold().cyan());
    match &active {
        Some(session) => print_session(session),
        None => println!("  none"),
    }

    println!("\n{}", "Past".bold().cyan());
    if past.is_empty() {
        println!("  none");
    }
    for session in &past {
        print_session(session);
    }
    Ok(())
}

async fn join(api: &ApiClient, config: &Config, code: &str, watch: bool) -> Result<()> {
    let student = StudentSession::for_signed_in_user(api.clone(), config.realtime.clone()).await?;
    let session = student.join_session(code).await?;

    println!("{} Joined session", "✓".green());
    println!("\n{}", "═".repeat(50).green());
    println!("{} {}", "Subject:".bold(), session.subject.green().bold());
    println!("{} {}", "Session ID:".bold(), session.id);
    println!("{}", "═".repeat(50).green());

    if watch {
        follow_student(&student).await;
    }
    student.close().await;
    Ok(())
}

async fn watch_active(api: &ApiClient, config: &Config) -> Result<()> {
    let student = StudentSession::for_signed_in_user(api.clone(), config.realtime.clone()).await?;
    match student.load_active_session().await? {
        Some(session) => {
            println!("{} Following {} ({})", "✓".green(), session.subject.bold(), session.session_code);
            follow_student(&student).await;
            student.close().await;
        }
        None => println!("{}", "No active session".yellow()),
    }
    Ok(())
}

async fn follow_student(student: &StudentSession) {
    if !student.is_connected().await {
        println!("{}", "⚠ Realtime channel unavailable".yellow());
        return;
    }
    println!("Press {} to stop.", "Ctrl+C".bold());

    let mut rx = student.subscribe();
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                print_student_state(&state);
                if state.current_session.is_none() {
                    println!("{} Session is over", "✗".yellow());
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

fn print_student_state(state: &SessionState) {
    if let Some(error) = &state.error {
        println!("{} {}", "✗".red(), error);
        return;
    }
    let stats = &state.stats;
    println!(
        "{} engagement={} focus={} emotion={}",
        "◀".green(),
        stats.engagement.map(|e| e.to_string()).unwrap_or_else(|| "-".into()),
        stats.focus_level.map(|f| f.to_string()).unwrap_or_else(|| "-".into()),
        stats.emotion.as_deref().unwrap_or("-")
    );
}

async fn engage(api: &ApiClient, config: &Config, update: StatsUpdate) -> Result<()> {
    if update.is_empty() {
        println!("{}", "Nothing to report; pass --engagement, --focus or --emotion".yellow());
        return Ok(());
    }

    let student = StudentSession::for_signed_in_user(api.clone(), config.realtime.clone()).await?;
    if student.load_active_session().await?.is_none() {
        println!("{}", "No active session".yellow());
        return Ok(());
    }

    let delivery = student.update_engagement(update).await?;
    student.close().await;

    match delivery {
        Delivery::Realtime => println!("{} Sent over the session channel", "✓".green()),
        Delivery::Rest => println!("{} Sent over REST", "✓".green()),
        Delivery::LocalOnly => println!("{}", "Stored locally only".yellow()),
    }
    Ok(())
}

async fn teacher(api: &ApiClient, config: &Config, action: TeacherCommand) -> Result<()> {
    let user = match api.tokens().user()? {
        Some(user) => user,
        None => api.me().await?,
    };
    let teacher = TeacherSession::new(api.clone(), config.realtime.clone(), user.id);

    match action {
        TeacherCommand::Create {
            subject,
            max_students,
        } => {
            let session = teacher.create(&subject, max_students).await?;
            println!("{} Session created", "✓".green());
            println!("\n{}", "═".repeat(50).green());
            println!("{} {}", "Code:".bold(), session.session_code.green().bold());
            println!("{} {}", "Session ID:".bold(), session.id);
            println!("{}", "═".repeat(50).green());
            println!("Start it with {}", format!("engage-cli teacher start {}", session.id).cyan());
        }
        TeacherCommand::Start { session_id } => {
            let session = teacher.start(&session_id).await?;
            println!("{} Session {} started", "✓".green(), session.session_code.bold());
            monitor(&teacher).await;
            teacher.close().await;
        }
        TeacherCommand::End => {
            let session = api.active_teacher_session().await?;
            let ended = api.end_session(&session.id).await?;
            println!("{} Session {} ended", "✓".green(), ended.session_code.bold());
        }
        TeacherCommand::Monitor => {
            let session = api.active_teacher_session().await?;
            teacher.attach(session).await?;
            monitor(&teacher).await;
            teacher.close().await;
        }
    }
    Ok(())
}

async fn monitor(teacher: &TeacherSession) {
    println!("Monitoring students. Press {} to stop.", "Ctrl+C".bold());

    let mut rx = teacher.subscribe();
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                print_classroom(&state);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

fn print_classroom(state: &ClassroomState) {
    if let Some(error) = &state.error {
        println!("{} {}", "✗".red(), error);
    }
    if state.students.is_empty() {
        return;
    }

    println!("{}", "─".repeat(60));
    for update in state.students.values() {
        let engagement = match update.stats.engagement {
            Some(Engagement::Active) => "active".green(),
            Some(Engagement::Passive) => "passive".yellow(),
            Some(Engagement::Distracted) => "distracted".red(),
            None => "-".normal(),
        };
        println!(
            "  {:<24} {:<12} focus {:>3}",
            update.student_name,
            engagement,
            update.stats.focus_level.map(|f| f.to_string()).unwrap_or_else(|| "-".into())
        );
    }
    if let Some(avg) = state.average_focus() {
        println!("  {} {:.0}", "Average focus:".bold(), avg);
    }
}

async fn notifications(api: &ApiClient, unread_only: bool, mark_all_read: bool) -> Result<()> {
    let query = NotificationQuery {
        unread_only,
        ..Default::default()
    };
    let list = api.notifications(query).await?;

    if list.is_empty() {
        println!("No notifications");
    }
    for n in &list {
        let marker = if n.read { " ".normal() } else { "●".cyan() };
        println!("{} {} {}", marker, n.title.bold(), n.created_at.format("%Y-%m-%d %H:%M"));
        println!("    {}", n.message);
    }

    if mark_all_read {
        let message = api.mark_all_notifications_read().await?;
        println!("{} {}", "✓".green(), message);
    }
    Ok(())
}

async fn export(
    api: &ApiClient,
    session_id: &str,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    println!("{}", "Exporting report...".cyan());
    let file = api.export_session_report(session_id, format).await?;
    let path = output.unwrap_or_else(|| PathBuf::from(&file.file_name));

    tokio::fs::write(&path, &file.bytes).await?;
    println!(
        "{} Wrote {} bytes to {}",
        "✓".green(),
        file.bytes.len(),
        path.display()
    );
    Ok(())
}

async fn admin_stats(api: &ApiClient) -> Result<()> {
    let stats = api.system_stats().await?;
    println!("\n{}", "Platform".bold().cyan());
    println!("  Users: {} ({} teachers, {} students, {} admins)",
        stats.total_users, stats.total_teachers, stats.total_students, stats.total_admins);
    println!("  Sessions: {} ({} active, {} completed)",
        stats.total_sessions, stats.active_sessions, stats.completed_sessions);
    Ok(())
}

fn print_session(session: &Session) {
    let status = if session.is_active {
        "live".green()
    } else {
        "ended".normal()
    };
    println!(
        "  {} {:<20} {} students  {}  [{}]",
        session.session_code.bold(),
        session.subject,
        session.students.len(),
        session.created_at.format("%Y-%m-%d %H:%M"),
        status
    );
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        return Err(ClientError::InvalidConfiguration("password is required".to_string()));
    }
    Ok(value)
}
