use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use crate::api::{ProfileForm, RegisterForm, TaskpadApi};
use crate::cache::LocalCache;
use crate::cli::{AddArgs, Command, EditArgs};
use crate::config::Config;
use crate::datetime::{DisplayZone, DueTime, parse_due_date};
use crate::error::ApiError;
use crate::http::{AuthenticatedHttpClient, Navigator, ReqwestTransport, Transport};
use crate::render::Renderer;
use crate::session::SessionStore;
use crate::task::{NewTask, Task, TaskCommand, TaskEdit, TaskOutcome, ToggleField};
use crate::view::{Tab, TaskViewFilter, project};

/// Terminal stand-in for the login screen.
#[derive(Debug, Default)]
pub struct LoginPrompt;

impl Navigator for LoginPrompt {
    fn redirect_to_login(&self) {
        warn!("session ended; sign-in required");
        eprintln!("Your session has ended. Run `taskpad login <username>` to sign in again.");
    }
}

#[instrument(skip(cfg, cache, sessions, renderer, command), fields(command = command.name()))]
pub async fn dispatch(
    cfg: &Config,
    cache: &LocalCache,
    sessions: Arc<dyn SessionStore>,
    renderer: &Renderer,
    zone: DisplayZone,
    command: Command,
) -> anyhow::Result<()> {
    if let Command::Config = command {
        return cmd_config(cfg);
    }

    let base_url = cfg.base_url();
    let transport = ReqwestTransport::new(&base_url, cfg.timeout()?)
        .with_context(|| format!("failed to set up HTTP client for {base_url}"))?;
    let http = AuthenticatedHttpClient::new(
        transport,
        sessions,
        Arc::new(LoginPrompt),
        cfg.refresh_path(),
    );
    let api = TaskpadApi::new(http, zone);

    debug!(base_url = %base_url, "dispatching command");
    run_command(&api, cache, renderer, command).await
}

pub async fn run_command<T: Transport>(
    api: &TaskpadApi<T>,
    cache: &LocalCache,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let today = api.zone().today();

    match command {
        Command::Login { username, password } => cmd_login(api, renderer, &username, password).await,
        Command::Google { credential } => cmd_google(api, renderer, &credential).await,
        Command::Logout => cmd_logout(api, cache),
        Command::Register {
            full_name,
            username,
            email,
            password,
            confirm_password,
        } => {
            let password = secret_or_stdin(password, "Password")?;
            let confirm_password = secret_or_stdin(confirm_password, "Confirm password")?;
            let form = RegisterForm {
                full_name,
                username,
                email,
                password,
                confirm_password,
            };
            cmd_register(api, &form).await
        }
        Command::ResetPassword { email } => cmd_reset_password(api, &email).await,
        Command::ConfirmReset {
            uid,
            token,
            password,
            confirm_password,
        } => {
            let password = secret_or_stdin(password, "New password")?;
            let confirm_password = secret_or_stdin(confirm_password, "Confirm password")?;
            cmd_confirm_reset(api, &uid, &token, &password, &confirm_password).await
        }
        Command::VerifyEmail { uid, token } => cmd_verify_email(api, &uid, &token).await,
        Command::Whoami => cmd_whoami(api, renderer),
        Command::Profile {
            username,
            password,
            confirm_password,
        } => {
            let form = ProfileForm {
                username,
                password,
                confirm_password,
            };
            cmd_profile(api, renderer, form).await
        }
        Command::List {
            tab,
            search,
            offline,
        } => cmd_list(api, cache, renderer, tab, &search, offline, today).await,
        Command::Add(args) => cmd_add(api, cache, renderer, args, today).await,
        Command::Edit(args) => cmd_edit(api, cache, renderer, args, today).await,
        Command::Toggle { id, important } => {
            let field = if important {
                ToggleField::Important
            } else {
                ToggleField::Completed
            };
            cmd_toggle(api, cache, &id, field, today).await
        }
        Command::Delete { id } => cmd_delete(api, cache, id, today).await,
        Command::Prefs {
            tab,
            sidebar_collapsed,
        } => cmd_prefs(cache, tab, sidebar_collapsed),
        Command::Config => Err(anyhow!("`config` needs the loaded configuration")),
    }
}

// ApiError already knows how to phrase itself for a person; the raw
// form goes to the log.
fn surface(err: ApiError) -> anyhow::Error {
    debug!(error = %err, "api call failed");
    anyhow!(err.user_message())
}

#[instrument(skip(api, renderer, password))]
async fn cmd_login<T: Transport>(
    api: &TaskpadApi<T>,
    renderer: &Renderer,
    username: &str,
    password: Option<String>,
) -> anyhow::Result<()> {
    info!("command login");
    let password = secret_or_stdin(password, "Password")?;
    let session = api.login(username, &password).await.map_err(surface)?;
    renderer.print_session(&session)
}

#[instrument(skip_all)]
async fn cmd_google<T: Transport>(
    api: &TaskpadApi<T>,
    renderer: &Renderer,
    credential: &str,
) -> anyhow::Result<()> {
    info!("command google");
    let session = api.google_login(credential).await.map_err(surface)?;
    renderer.print_session(&session)
}

#[instrument(skip(api, cache))]
fn cmd_logout<T: Transport>(api: &TaskpadApi<T>, cache: &LocalCache) -> anyhow::Result<()> {
    info!("command logout");
    api.logout().map_err(surface)?;
    cache.clear_tasks()?;
    println!("Signed out.");
    Ok(())
}

#[instrument(skip(api, form), fields(username = %form.username))]
async fn cmd_register<T: Transport>(api: &TaskpadApi<T>, form: &RegisterForm) -> anyhow::Result<()> {
    info!("command register");
    api.register(form).await.map_err(surface)?;
    println!(
        "Account created. Check {} for a verification link.",
        form.email.trim()
    );
    Ok(())
}

#[instrument(skip(api))]
async fn cmd_reset_password<T: Transport>(api: &TaskpadApi<T>, email: &str) -> anyhow::Result<()> {
    info!("command reset-password");
    api.request_password_reset(email).await.map_err(surface)?;
    println!("If an account exists for {}, a reset link is on its way.", email.trim());
    Ok(())
}

#[instrument(skip(api, token, password, confirm_password))]
async fn cmd_confirm_reset<T: Transport>(
    api: &TaskpadApi<T>,
    uid: &str,
    token: &str,
    password: &str,
    confirm_password: &str,
) -> anyhow::Result<()> {
    info!("command confirm-reset");
    api.confirm_password_reset(uid, token, password, confirm_password)
        .await
        .map_err(surface)?;
    println!("Password updated. You can now log in.");
    Ok(())
}

#[instrument(skip(api, token))]
async fn cmd_verify_email<T: Transport>(
    api: &TaskpadApi<T>,
    uid: &str,
    token: &str,
) -> anyhow::Result<()> {
    info!("command verify-email");
    api.verify_email(uid, token).await.map_err(surface)?;
    println!("Email verified.");
    Ok(())
}

fn cmd_whoami<T: Transport>(api: &TaskpadApi<T>, renderer: &Renderer) -> anyhow::Result<()> {
    match api.session() {
        Some(session) => renderer.print_session(&session),
        None => {
            println!("Not signed in.");
            Ok(())
        }
    }
}

#[instrument(skip(api, renderer, form))]
async fn cmd_profile<T: Transport>(
    api: &TaskpadApi<T>,
    renderer: &Renderer,
    mut form: ProfileForm,
) -> anyhow::Result<()> {
    info!("command profile");

    if form.username.is_none() && form.password.is_none() {
        let profile = api.profile().await.map_err(surface)?;
        return renderer.print_profile(&profile);
    }

    if form.password.is_some() && form.confirm_password.is_none() {
        form.confirm_password = Some(secret_or_stdin(None, "Confirm password")?);
    }
    api.update_profile(&form).await.map_err(surface)?;
    println!("Profile updated.");
    Ok(())
}

#[instrument(skip(api, cache, renderer, today))]
async fn cmd_list<T: Transport>(
    api: &TaskpadApi<T>,
    cache: &LocalCache,
    renderer: &Renderer,
    tab: Option<Tab>,
    search: &str,
    offline: bool,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command list");

    let mut prefs = cache.load_prefs()?;
    let tab = tab.unwrap_or(prefs.active_tab);
    if tab != prefs.active_tab {
        prefs.active_tab = tab;
        cache.save_prefs(&prefs)?;
    }

    let tasks = if offline {
        cache.load_tasks()?
    } else {
        match api.list_tasks().await {
            Ok(tasks) => {
                cache.save_tasks(&tasks)?;
                tasks
            }
            Err(err) if err.is_network() => {
                warn!(error = %err, "server unreachable; showing cached tasks");
                eprintln!("{} Showing cached tasks.", err.user_message());
                cache.load_tasks()?
            }
            Err(err) => return Err(surface(err)),
        }
    };

    let view = project(&tasks, &TaskViewFilter::new(tab, search), today);
    debug!(shown = view.items.len(), total = view.counts.total, "projected tasks");
    renderer.print_projection(&view, today)
}

#[instrument(skip(api, cache, renderer, args, today), fields(title = %args.title))]
async fn cmd_add<T: Transport>(
    api: &TaskpadApi<T>,
    cache: &LocalCache,
    renderer: &Renderer,
    args: AddArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command add");

    let due_date = args
        .due
        .as_deref()
        .map(|raw| parse_due_date(raw, today))
        .transpose()?;
    let due_time = args.at.as_deref().map(str::parse::<DueTime>).transpose()?;
    let new_task = NewTask {
        title: args.title,
        description: args.description,
        due_date,
        due_time,
        important: args.important,
    };

    let outcome = api
        .execute(TaskCommand::Create(new_task), today)
        .await
        .map_err(surface)?;
    let task = saved(outcome)?;
    cache.upsert_task(&task)?;

    println!("Created task {}.", task.id);
    renderer.print_task(&task, today)
}

#[instrument(skip(api, cache, renderer, args, today), fields(id = %args.id))]
async fn cmd_edit<T: Transport>(
    api: &TaskpadApi<T>,
    cache: &LocalCache,
    renderer: &Renderer,
    args: EditArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command edit");

    let edit = TaskEdit {
        title: args.title,
        description: args
            .description
            .map(|d| Some(d).filter(|d| !d.trim().is_empty())),
        due_date: args
            .due
            .as_deref()
            .map(|raw| clearable(raw, |raw| parse_due_date(raw, today)))
            .transpose()?,
        due_time: args
            .at
            .as_deref()
            .map(|raw| clearable(raw, str::parse::<DueTime>))
            .transpose()?,
        important: args.important,
        completed: args.completed,
    };

    let current = locate(api, cache, &args.id).await?;
    let outcome = api
        .execute(TaskCommand::Update { current, edit }, today)
        .await
        .map_err(surface)?;
    let task = saved(outcome)?;
    cache.upsert_task(&task)?;

    println!("Modified task {}.", task.id);
    renderer.print_task(&task, today)
}

#[instrument(skip(api, cache, today))]
async fn cmd_toggle<T: Transport>(
    api: &TaskpadApi<T>,
    cache: &LocalCache,
    id: &str,
    field: ToggleField,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command toggle");

    let current = locate(api, cache, id).await?;
    let value = !field.current(&current);
    let outcome = api
        .execute(
            TaskCommand::Toggle {
                current,
                field,
                value,
            },
            today,
        )
        .await
        .map_err(surface)?;
    let task = saved(outcome)?;
    cache.upsert_task(&task)?;

    let verb = match (field, value) {
        (ToggleField::Completed, true) => "Completed",
        (ToggleField::Completed, false) => "Reopened",
        (ToggleField::Important, true) => "Starred",
        (ToggleField::Important, false) => "Unstarred",
    };
    println!("{verb} task {}.", task.id);
    Ok(())
}

#[instrument(skip(api, cache, today))]
async fn cmd_delete<T: Transport>(
    api: &TaskpadApi<T>,
    cache: &LocalCache,
    id: String,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command delete");

    let outcome = api
        .execute(TaskCommand::Delete { id }, today)
        .await
        .map_err(surface)?;
    let TaskOutcome::Deleted(id) = outcome else {
        return Err(anyhow!("server did not confirm the delete"));
    };
    cache.remove_task(&id)?;

    println!("Deleted task {id}.");
    Ok(())
}

#[instrument(skip(cache))]
fn cmd_prefs(
    cache: &LocalCache,
    tab: Option<Tab>,
    sidebar_collapsed: Option<bool>,
) -> anyhow::Result<()> {
    info!("command prefs");

    let mut prefs = cache.load_prefs()?;
    if tab.is_some() || sidebar_collapsed.is_some() {
        if let Some(tab) = tab {
            prefs.active_tab = tab;
        }
        if let Some(collapsed) = sidebar_collapsed {
            prefs.sidebar_collapsed = collapsed;
        }
        cache.save_prefs(&prefs)?;
    }

    println!("active_tab={}", prefs.active_tab);
    println!("sidebar_collapsed={}", prefs.sidebar_collapsed);
    Ok(())
}

fn cmd_config(cfg: &Config) -> anyhow::Result<()> {
    let mut pairs: Vec<_> = cfg.iter().collect();
    pairs.sort();
    for (k, v) in pairs {
        println!("{k}={v}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}

// Mutations need the server's current copy; this also brings the cache
// up to date.
async fn locate<T: Transport>(
    api: &TaskpadApi<T>,
    cache: &LocalCache,
    id: &str,
) -> anyhow::Result<Task> {
    let tasks = api.list_tasks().await.map_err(surface)?;
    cache.save_tasks(&tasks)?;
    tasks
        .into_iter()
        .find(|task| task.id == id)
        .ok_or_else(|| anyhow!("no task with id {id}"))
}

fn saved(outcome: TaskOutcome) -> anyhow::Result<Task> {
    match outcome {
        TaskOutcome::Saved(task) => Ok(task),
        TaskOutcome::Deleted(id) => Err(anyhow!("task {id} was deleted instead of saved")),
    }
}

fn clearable<V, E>(raw: &str, parse: impl FnOnce(&str) -> Result<V, E>) -> Result<Option<V>, E> {
    if raw.trim().eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        parse(raw).map(Some)
    }
}

fn secret_or_stdin(given: Option<String>, prompt: &str) -> anyhow::Result<String> {
    if let Some(value) = given {
        return Ok(value);
    }

    eprint!("{prompt}: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cli::GlobalCli;
    use crate::http::ApiResponse;
    use crate::http::testing::{RecordingNavigator, ScriptedTransport, json_response};
    use crate::session::{MemorySessionStore, SessionKey};
    use clap::Parser;

    fn signed_in_api(transport: ScriptedTransport) -> TaskpadApi<ScriptedTransport> {
        let store = Arc::new(MemorySessionStore::new());
        store.set(SessionKey::AccessToken, "acc").unwrap();
        store.set(SessionKey::RefreshToken, "ref").unwrap();
        let navigator: Arc<dyn Navigator> = Arc::new(RecordingNavigator::default());
        let http = AuthenticatedHttpClient::new(transport, store, navigator, "/auth/refresh/");
        TaskpadApi::new(http, DisplayZone::default())
    }

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["taskpad"];
        argv.extend_from_slice(args);
        GlobalCli::parse_from(argv).command
    }

    fn server_tasks() -> serde_json::Value {
        json!([
            { "id": 1, "title": "Buy milk", "is_important": false, "is_completed": false },
            { "id": 2, "title": "Pay rent", "is_important": true, "is_completed": false }
        ])
    }

    #[tokio::test]
    async fn list_falls_back_to_cache_when_offline() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path()).unwrap();
        cache.save_tasks(&[Task::new("7", "Cached")]).unwrap();

        let api = signed_in_api(ScriptedTransport::new(|_| {
            Err(ApiError::Network("connection refused".to_string()))
        }));
        run_command(&api, &cache, &Renderer::plain(), parse(&["list", "--tab", "important"]))
            .await
            .unwrap();

        assert_eq!(cache.load_tasks().unwrap()[0].id, "7");
        assert_eq!(cache.load_prefs().unwrap().active_tab, Tab::Important);
    }

    #[tokio::test]
    async fn list_surfaces_server_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path()).unwrap();
        let api = signed_in_api(ScriptedTransport::new(|_| {
            json_response(500, json!({ "detail": "boom" }))
        }));

        let err = run_command(&api, &cache, &Renderer::plain(), parse(&["list"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "request failed (HTTP 500): boom");
    }

    #[tokio::test]
    async fn list_refreshes_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path()).unwrap();
        let api = signed_in_api(ScriptedTransport::new(|_| json_response(200, server_tasks())));

        run_command(&api, &cache, &Renderer::plain(), parse(&["list", "-s", "rent"]))
            .await
            .unwrap();
        assert_eq!(cache.load_tasks().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn toggle_flips_the_server_value() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path()).unwrap();
        let api = signed_in_api(ScriptedTransport::new(|req| match req.method.as_str() {
            "GET" => json_response(200, server_tasks()),
            "PATCH" => json_response(
                200,
                json!({ "id": 2, "title": "Pay rent", "is_important": false, "is_completed": false }),
            ),
            _ => json_response(404, json!({})),
        }));

        run_command(&api, &cache, &Renderer::plain(), parse(&["toggle", "2", "--important"]))
            .await
            .unwrap();

        let patch = api
            .http()
            .transport()
            .requests()
            .into_iter()
            .find(|r| r.method.as_str() == "PATCH")
            .unwrap();
        assert_eq!(patch.path, "/todos/update_task/2/");
        assert_eq!(patch.body, Some(json!({ "is_important": false })));
        assert!(!cache.find_task("2").unwrap().unwrap().important);
    }

    #[tokio::test]
    async fn add_and_delete_keep_cache_in_step() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path()).unwrap();
        let api = signed_in_api(ScriptedTransport::new(|req| match req.method.as_str() {
            "POST" => {
                let mut body = req.body.clone().unwrap_or_default();
                body["id"] = json!(5);
                json_response(201, body)
            }
            "DELETE" => Ok(ApiResponse::new(204, "")),
            _ => json_response(404, json!({})),
        }));

        run_command(
            &api,
            &cache,
            &Renderer::plain(),
            parse(&["add", "Water plants", "--important"]),
        )
        .await
        .unwrap();
        let added = cache.find_task("5").unwrap().unwrap();
        assert_eq!(added.title, "Water plants");
        assert!(added.important);

        run_command(&api, &cache, &Renderer::plain(), parse(&["delete", "5"]))
            .await
            .unwrap();
        assert!(cache.find_task("5").unwrap().is_none());
    }

    #[tokio::test]
    async fn add_rejects_past_due_date_locally() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path()).unwrap();
        let api = signed_in_api(ScriptedTransport::new(|_| json_response(201, json!({}))));

        let err = run_command(
            &api,
            &cache,
            &Renderer::plain(),
            parse(&["add", "Too late", "--due", "2000-01-01"]),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("past"), "{err}");
        assert!(api.http().transport().requests().is_empty());
    }

    #[tokio::test]
    async fn logout_drops_cached_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path()).unwrap();
        cache.save_tasks(&[Task::new("1", "Private")]).unwrap();
        let api = signed_in_api(ScriptedTransport::new(|_| json_response(200, json!({}))));

        run_command(&api, &cache, &Renderer::plain(), parse(&["logout"]))
            .await
            .unwrap();
        assert!(cache.load_tasks().unwrap().is_empty());
        assert!(api.session().is_none());
    }

    #[test]
    fn none_clears_optional_edit_fields() {
        let cleared = clearable("None", |raw| raw.parse::<u32>());
        assert_eq!(cleared, Ok(None));
        assert_eq!(clearable("4", |raw| raw.parse::<u32>()), Ok(Some(4)));
    }
}
