use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::json;
use taskpad_core::api::TaskpadApi;
use taskpad_core::cache::LocalCache;
use taskpad_core::datetime::DisplayZone;
use taskpad_core::error::ApiError;
use taskpad_core::http::{ApiRequest, ApiResponse, AuthenticatedHttpClient, Navigator, Transport};
use taskpad_core::session::{FileSessionStore, SessionKey, SessionStore};
use taskpad_core::view::{Tab, TaskViewFilter, project};
use tempfile::tempdir;

/// Backend whose first access token has already expired by the time the
/// task list is fetched.
#[derive(Default)]
struct Backend {
    seen: Mutex<Vec<String>>,
}

impl Backend {
    fn answer(&self, request: &ApiRequest) -> ApiResponse {
        self.seen
            .lock()
            .push(format!("{} {}", request.method, request.path));
        let reply = match (request.method.as_str(), request.path.as_str(), request.bearer()) {
            ("POST", "/token/", None) => (
                200,
                json!({ "access": "acc-1", "refresh": "ref-1", "user": { "id": 7, "email": "kim@example.com" } }),
            ),
            ("POST", "/auth/refresh/", None)
                if request.body == Some(json!({ "refresh": "ref-1" })) =>
            {
                (200, json!({ "access": "acc-2" }))
            }
            ("GET", "/todos/", Some("acc-2")) => (
                200,
                json!([
                    { "id": 1, "title": "Buy milk", "deadline": null, "is_important": false, "is_completed": false, "user": 7 },
                    { "id": 2, "title": "Pay rent", "deadline": "2024-05-03T00:00:00Z", "is_important": true, "is_completed": false, "user": 7 },
                    { "id": 3, "title": "Dentist", "deadline": "2024-05-02T15:30:00Z", "is_important": false, "is_completed": false, "user": 7 },
                    { "id": 4, "title": "Call mom", "deadline": "2024-05-01T18:00:00Z", "is_important": false, "is_completed": false, "user": 7 },
                    { "id": 5, "title": "File taxes", "deadline": "2024-05-03T09:00:00Z", "is_important": false, "is_completed": true, "user": 7 }
                ]),
            ),
            _ => (401, json!({ "detail": "Given token not valid for any token type" })),
        };
        ApiResponse::new(reply.0, reply.1.to_string())
    }
}

impl Transport for Backend {
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        Ok(self.answer(request))
    }
}

#[derive(Default)]
struct CountingNavigator {
    redirects: AtomicUsize,
}

impl Navigator for CountingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn login_list_and_project_upcoming() {
    let temp = tempdir().expect("tempdir");
    let store: Arc<dyn SessionStore> =
        Arc::new(FileSessionStore::open(temp.path()).expect("open session store"));
    let navigator = Arc::new(CountingNavigator::default());
    let http = AuthenticatedHttpClient::new(
        Backend::default(),
        store.clone(),
        navigator.clone(),
        "/auth/refresh/",
    );
    let api = TaskpadApi::new(http, DisplayZone::default());

    let session = api.login("kim", "hunter22").await.expect("login should succeed");
    assert_eq!(session.access_token, "acc-1");

    let tasks = api.list_tasks().await.expect("list should recover with a refresh");
    assert_eq!(tasks.len(), 5);
    assert_eq!(
        *api.http().transport().seen.lock(),
        [
            "POST /token/",
            "GET /todos/",
            "POST /auth/refresh/",
            "GET /todos/",
        ]
    );
    assert_eq!(navigator.redirects.load(Ordering::SeqCst), 0);

    let reopened = FileSessionStore::open(temp.path()).expect("reopen session store");
    assert_eq!(reopened.get(SessionKey::AccessToken).as_deref(), Some("acc-2"));
    assert_eq!(reopened.get(SessionKey::RefreshToken).as_deref(), Some("ref-1"));

    let today = NaiveDate::from_ymd_opt(2024, 5, 1).expect("date");
    let view = project(&tasks, &TaskViewFilter::new(Tab::Upcoming, ""), today);
    let groups = view.groups.expect("upcoming is grouped");
    let summary: Vec<(&str, Vec<&str>)> = groups
        .iter()
        .map(|g| {
            (
                g.label.as_str(),
                g.tasks.iter().map(|t| t.title.as_str()).collect(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        [
            ("Tomorrow", vec!["Dentist"]),
            ("May 3", vec!["Pay rent"]),
        ]
    );

    assert_eq!(view.counts.total, 5);
    assert_eq!(view.counts.completed, 1);
    assert_eq!(view.counts.uncompleted, 4);
    assert_eq!(view.counts.today, 1);
    assert_eq!(view.counts.upcoming, 2);
    assert_eq!(view.counts.important, 1);

    let cache = LocalCache::open(temp.path()).expect("open cache");
    cache.save_tasks(&tasks).expect("save tasks");
    let offline = project(
        &cache.load_tasks().expect("load tasks"),
        &TaskViewFilter::new(Tab::Today, "mom"),
        today,
    );
    assert_eq!(offline.items.len(), 1);
    assert_eq!(offline.items[0].id, "4");
}
