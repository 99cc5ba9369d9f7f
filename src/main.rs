use std::sync::Arc;

use chrono::{Local, NaiveDate};

use care_tracker::config::CareConfig;
use care_tracker::core::calendar::{WeekSelector, weekday_initial};
use care_tracker::core::notice::Notice;
use care_tracker::core::profile::ProfileEdit;
use care_tracker::core::settings::Settings;
use care_tracker::core::task::{Task, TaskId};
use care_tracker::sync::account::{AccountService, Registration};
use care_tracker::sync::gateway::HttpGateway;
use care_tracker::sync::store::FileStore;
use care_tracker::sync::{RefreshOutcome, TaskSynchronizer};

const USAGE: &str = "usage: care-tracker <command>

  login <email> <password>
  register <name> <forename> <email> <phone> <password> <confirm>
  logout
  tasks
  refresh
  week [YYYY-MM-DD] [--select YYYY-MM-DD]
  remark <task-id> <text>
  profile
  profile-edit <field>=<value>...
  settings [theme|offline|nfc]";

struct App {
    accounts: AccountService,
    tasks: TaskSynchronizer,
    store: Arc<FileStore>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CareConfig::load();

    // Log to the systemd user journal (`journalctl --user -t care-tracker -f`).
    // Crate targets at info/debug (per config), everything else at warn.
    {
        struct FilteredJournal {
            inner: systemd_journal_logger::JournalLog,
        }

        impl log::Log for FilteredJournal {
            fn enabled(&self, metadata: &log::Metadata) -> bool {
                if metadata.target().starts_with("care_tracker") {
                    let max = if care_tracker::debug_logging() {
                        log::LevelFilter::Debug
                    } else {
                        log::LevelFilter::Info
                    };
                    metadata.level() <= max
                } else {
                    metadata.level() <= log::LevelFilter::Warn
                }
            }
            fn log(&self, record: &log::Record) {
                if self.enabled(record.metadata()) {
                    self.inner.log(record);
                }
            }
            fn flush(&self) {
                self.inner.flush();
            }
        }

        care_tracker::set_debug_logging(config.debug_logging);

        match systemd_journal_logger::JournalLog::new() {
            Ok(journal) => {
                let journal = journal.with_syslog_identifier("care-tracker".to_string());
                if log::set_boxed_logger(Box::new(FilteredJournal { inner: journal })).is_ok() {
                    // Debug must pass the global gate so the runtime toggle works.
                    log::set_max_level(log::LevelFilter::Debug);
                }
            }
            Err(e) => eprintln!("journal logging unavailable: {}", e),
        }
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let store = Arc::new(FileStore::new(config.preferences_path()));
    let api = Arc::new(HttpGateway::new(&config.api_base_url, config.request_timeout())?);
    let app = App {
        accounts: AccountService::new(api.clone(), store.clone()),
        tasks: TaskSynchronizer::new(api, store.clone()),
        store,
    };

    let result = match command.as_str() {
        "login" => login(&app, &args[1..]).await,
        "register" => register(&app, &args[1..]).await,
        "logout" => app.accounts.logout().await.map(|()| println!("Déconnecté.")),
        "tasks" => {
            print_outcome(&app.tasks.mount().await);
            Ok(())
        }
        "refresh" => {
            print_outcome(&app.tasks.refresh(true).await);
            Ok(())
        }
        "week" => week(&app, &args[1..]).await,
        "remark" => remark(&app, &args[1..]).await,
        "profile" => profile(&app).await,
        "profile-edit" => profile_edit(&app, &args[1..]).await,
        "settings" => settings(&app, args.get(1).map(String::as_str)).await,
        other => {
            eprintln!("unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        print_notice(&Notice::from_error(&e));
        std::process::exit(1);
    }
    Ok(())
}

async fn login(app: &App, args: &[String]) -> care_tracker::Result<()> {
    let [email, password] = args else {
        return usage_error();
    };
    app.accounts.login(email, password).await?;
    println!("Connecté.");
    Ok(())
}

async fn register(app: &App, args: &[String]) -> care_tracker::Result<()> {
    let [name, forename, email, phone, password, confirm] = args else {
        return usage_error();
    };
    let form = Registration {
        name: name.clone(),
        forename: forename.clone(),
        email: email.clone(),
        phone: phone.clone(),
        password: password.clone(),
        confirm_password: confirm.clone(),
    };
    match app.accounts.register(&form).await? {
        Some(user) => println!("Bienvenue, {}.", user.display_name()),
        None => println!("Compte créé."),
    }
    Ok(())
}

async fn week(app: &App, args: &[String]) -> care_tracker::Result<()> {
    let mut selector = WeekSelector::new(Local::now().date_naive());
    let mut selected = None;
    let mut rest = args.iter();
    while let Some(arg) = rest.next() {
        if arg == "--select" {
            let Some(date) = rest.next() else {
                return usage_error();
            };
            selected = Some(parse_date(date)?);
        } else {
            selector.pivot = parse_date(arg)?;
            selector.select_date(selector.pivot);
        }
    }
    if let Some(date) = selected {
        selector.select_date(date);
    }

    let outcome = app.tasks.mount().await;
    if let Some(notice) = outcome.notice() {
        print_notice(notice);
    }
    let view = app.tasks.view();

    println!("{}", selector.month_year_label());
    for day in selector.days() {
        let mark = match (selector.is_selected(day), selector.is_today(day)) {
            (true, _) => '*',
            (false, true) => '.',
            _ => ' ',
        };
        println!("{}{} {}", mark, weekday_initial(day), day.format("%d"));
    }
    if !selector.selection_in_view() {
        println!("(jour sélectionné hors de la semaine affichée)");
    }
    println!();

    let tasks = selector.tasks_for_selected(&view.tasks);
    if tasks.is_empty() {
        println!("Aucune tâche pour ce jour.");
    }
    for task in tasks {
        print_task(task);
    }
    Ok(())
}

async fn remark(app: &App, args: &[String]) -> care_tracker::Result<()> {
    let Some((id, words)) = args.split_first() else {
        return usage_error();
    };
    if words.is_empty() {
        return usage_error();
    }
    app.tasks.mount().await;
    app.tasks
        .update_remark(&TaskId::new(id.as_str()), &words.join(" "))
        .await?;
    print_notice(&Notice::remark_saved());
    Ok(())
}

async fn profile(app: &App) -> care_tracker::Result<()> {
    let user = app.accounts.profile().await?;
    println!("{}", user.display_name());
    for (label, value) in [
        ("Email", &user.email),
        ("Téléphone", &user.phone),
        ("Adresse", &user.address),
        ("Rôle", &user.role),
    ] {
        println!("  {:<10} {}", label, value.as_deref().unwrap_or("-"));
    }
    Ok(())
}

async fn profile_edit(app: &App, args: &[String]) -> care_tracker::Result<()> {
    let mut edit = ProfileEdit::default();
    for pair in args {
        let Some((field, value)) = pair.split_once('=') else {
            return usage_error();
        };
        if !edit.set(field, value) {
            return Err(care_tracker::Error::Validation(format!(
                "Champ inconnu ou non modifiable : {}",
                field
            )));
        }
    }
    if edit.is_empty() {
        return usage_error();
    }
    let saved = app.accounts.save_profile(&edit).await?;
    println!("Profil mis à jour : {}", saved.display_name());
    Ok(())
}

async fn settings(app: &App, toggle: Option<&str>) -> care_tracker::Result<()> {
    let store = app.store.as_ref();
    let mut settings = Settings::load(store).await?;
    match toggle {
        None => {}
        Some("theme") => {
            settings.toggle_theme(store, false).await?;
        }
        Some("offline") => {
            settings.toggle_offline_mode(store).await?;
        }
        Some("nfc") => {
            settings.toggle_nfc(store).await?;
        }
        Some(_) => return usage_error(),
    }
    let theme = settings.theme.map(|t| t.as_str()).unwrap_or("système");
    println!("Thème          {}", theme);
    println!("Mode hors-ligne {}", on_off(settings.offline_mode));
    println!("NFC            {}", on_off(settings.nfc_enabled));
    Ok(())
}

fn print_outcome(outcome: &RefreshOutcome) {
    if let Some(notice) = outcome.notice() {
        print_notice(notice);
    }
    let Some(view) = outcome.view() else {
        println!("Non connecté. Utilisez `care-tracker login`.");
        return;
    };
    if view.offline {
        println!("[hors-ligne]");
    }
    if let RefreshOutcome::Online { quarantined, .. } = outcome {
        if *quarantined > 0 {
            println!("({} tâche(s) illisible(s) ignorée(s))", quarantined);
        }
    }
    if view.tasks.is_empty() {
        println!("Aucune tâche.");
    }
    for task in &view.tasks {
        print_task(task);
    }
}

fn print_task(task: &Task) {
    println!(
        "{} [{}] {} {}  {}  {}",
        if task.status.is_done() { "✓" } else { " " },
        task.id,
        task.date,
        task.time_window(),
        task.intervention_type,
        task.status.label().unwrap_or("Inconnu"),
    );
    if let Some(client) = &task.client_name {
        println!("      {}", client);
    }
    if let Some(address) = &task.address {
        println!("      {}", address);
    }
    if let Some(remarks) = task.remarks.as_deref().filter(|r| !r.is_empty()) {
        println!("      « {} »", remarks);
    }
}

fn print_notice(notice: &Notice) {
    eprintln!("{} : {}", notice.title, notice.message);
}

fn on_off(value: bool) -> &'static str {
    if value { "activé" } else { "désactivé" }
}

fn parse_date(s: &str) -> care_tracker::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| care_tracker::Error::Validation(format!("Date invalide : {}", s)))
}

fn usage_error() -> care_tracker::Result<()> {
    eprintln!("{}", USAGE);
    std::process::exit(2);
}
