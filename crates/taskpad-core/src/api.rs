use std::sync::Arc;

use chrono::NaiveDate;
use taskpad_wire::{
    GoogleCredential, LoginRequest, PasswordResetConfirm, PasswordResetRequest, ProfileDto,
    ProfileUpdate, RegisterRequest, TaskDto, TokenResponse, endpoints,
};
use tracing::{debug, info, instrument};

use crate::datetime::DisplayZone;
use crate::error::ApiError;
use crate::http::{ApiRequest, AuthenticatedHttpClient, Transport};
use crate::session::{AuthSession, SessionKey, SessionStore};
use crate::task::{Task, TaskCommand, TaskOutcome};
use crate::validate::{self, ValidationError};

/// Fields of the sign-up form.
#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate::require("full name", &self.full_name)?;
        validate::require("username", &self.username)?;
        validate::email(&self.email)?;
        validate::passwords_match(&self.password, &self.confirm_password)
    }
}

/// Fields of the account settings form.
#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

impl ProfileForm {
    pub fn validate(&self) -> Result<ProfileUpdate, ValidationError> {
        let username = self
            .username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let password = match &self.password {
            Some(password) => {
                validate::passwords_match(password, self.confirm_password.as_deref().unwrap_or(""))?;
                Some(password.clone())
            }
            None => None,
        };
        if username.is_none() && password.is_none() {
            return Err(ValidationError::EmptyUpdate);
        }
        Ok(ProfileUpdate { username, password })
    }
}

/// Every backend call the client makes, composed on one
/// `AuthenticatedHttpClient`.
pub struct TaskpadApi<T> {
    http: AuthenticatedHttpClient<T>,
    zone: DisplayZone,
}

impl<T: Transport> TaskpadApi<T> {
    pub fn new(http: AuthenticatedHttpClient<T>, zone: DisplayZone) -> Self {
        Self { http, zone }
    }

    pub fn http(&self) -> &AuthenticatedHttpClient<T> {
        &self.http
    }

    pub fn zone(&self) -> DisplayZone {
        self.zone
    }

    fn store(&self) -> &Arc<dyn SessionStore> {
        self.http.store()
    }

    pub fn session(&self) -> Option<AuthSession> {
        AuthSession::load(self.store().as_ref())
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthSession, ApiError> {
        validate::require("username", username)?;
        validate::require("password", password)?;
        let request = ApiRequest::post(endpoints::TOKEN).json(&LoginRequest {
            username: username.trim().to_string(),
            password: password.to_string(),
        })?;
        let tokens: TokenResponse = self.http.send_public_json(request).await?;
        self.start_session(tokens, Some(username.trim()))
    }

    #[instrument(skip_all)]
    pub async fn google_login(&self, credential: &str) -> Result<AuthSession, ApiError> {
        validate::require("credential", credential)?;
        let request = ApiRequest::post(endpoints::GOOGLE).json(&GoogleCredential {
            credential: credential.to_string(),
        })?;
        let tokens: TokenResponse = self.http.send_public_json(request).await?;
        self.start_session(tokens, None)
    }

    fn start_session(
        &self,
        tokens: TokenResponse,
        fallback_name: Option<&str>,
    ) -> Result<AuthSession, ApiError> {
        let session = AuthSession {
            user_id: tokens.user_id(),
            email: tokens.user_email(),
            display_name: tokens.user_name().or_else(|| fallback_name.map(str::to_string)),
            access_token: tokens.access,
            refresh_token: tokens.refresh,
        };
        session.save(self.store().as_ref())?;
        info!(user_id = ?session.user_id, "signed in");
        Ok(session)
    }

    #[instrument(skip(self))]
    pub fn logout(&self) -> Result<(), ApiError> {
        self.store().clear()?;
        info!("signed out");
        Ok(())
    }

    #[instrument(skip(self, form), fields(username = %form.username))]
    pub async fn register(&self, form: &RegisterForm) -> Result<(), ApiError> {
        form.validate()?;
        let request = ApiRequest::post(endpoints::REGISTER).json(&RegisterRequest {
            full_name: form.full_name.trim().to_string(),
            username: form.username.trim().to_string(),
            email: form.email.trim().to_string(),
            password: form.password.clone(),
            confirm_password: form.confirm_password.clone(),
        })?;
        self.http.send_public(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ApiError> {
        validate::email(email)?;
        let request = ApiRequest::post(endpoints::PASSWORD_RESET).json(&PasswordResetRequest {
            email: email.trim().to_string(),
        })?;
        self.http.send_public(request).await?;
        Ok(())
    }

    #[instrument(skip(self, token, password, confirm_password))]
    pub async fn confirm_password_reset(
        &self,
        uid: &str,
        token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<(), ApiError> {
        validate::require("uid", uid)?;
        validate::require("token", token)?;
        validate::passwords_match(password, confirm_password)?;
        let request = ApiRequest::post(endpoints::password_reset_confirm(uid, token))
            .redact_path(endpoints::password_reset_confirm(uid, "<token>"))
            .json(&PasswordResetConfirm {
                new_password: password.to_string(),
                confirm_password: confirm_password.to_string(),
            })?;
        self.http.send_public(request).await?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    pub async fn verify_email(&self, uid: &str, token: &str) -> Result<(), ApiError> {
        validate::require("uid", uid)?;
        validate::require("token", token)?;
        let request = ApiRequest::get(endpoints::verify_email(uid, token))
            .redact_path(endpoints::verify_email(uid, "<token>"));
        self.http.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<ProfileDto, ApiError> {
        self.http.send_json(ApiRequest::get(endpoints::USER)).await
    }

    #[instrument(skip(self, form))]
    pub async fn update_profile(&self, form: &ProfileForm) -> Result<(), ApiError> {
        let update = form.validate()?;
        let request = ApiRequest::put(endpoints::USER).json(&update)?;
        self.http.send(request).await?;
        if let Some(username) = &update.username {
            self.store().set(SessionKey::UserName, username)?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_tasks(&self) -> Result<Vec<Task>, ApiError> {
        let dtos: Vec<TaskDto> = self.http.send_json(ApiRequest::get(endpoints::TODOS)).await?;
        debug!(count = dtos.len(), "fetched tasks");
        Ok(dtos
            .into_iter()
            .map(|dto| Task::from_dto(dto, self.zone))
            .collect())
    }

    /// Runs one task mutation. Validation happens here, before anything
    /// is sent.
    #[instrument(skip(self, command, today))]
    pub async fn execute(
        &self,
        command: TaskCommand,
        today: NaiveDate,
    ) -> Result<TaskOutcome, ApiError> {
        match command {
            TaskCommand::Create(new_task) => {
                new_task.validate(today)?;
                let payload = new_task
                    .into_task()
                    .to_payload(self.store().get(SessionKey::UserId), self.zone)?;
                let request = ApiRequest::post(endpoints::CREATE_TASK).json(&payload)?;
                let dto: TaskDto = self.http.send_json(request).await?;
                info!(id = %dto.id, "created task");
                Ok(TaskOutcome::Saved(Task::from_dto(dto, self.zone)))
            }
            TaskCommand::Update { current, edit } => {
                let edited = edit.apply(&current);
                edit.validate(&edited, today)?;
                let payload = edited.to_payload(self.store().get(SessionKey::UserId), self.zone)?;
                let request =
                    ApiRequest::put(endpoints::update_task(&current.id)).json(&payload)?;
                let saved = self.saved_or(request, edited).await?;
                info!(id = %saved.id, "updated task");
                Ok(TaskOutcome::Saved(saved))
            }
            TaskCommand::Toggle {
                mut current,
                field,
                value,
            } => {
                let request = ApiRequest::patch(endpoints::update_task(&current.id))
                    .json(&field.payload(value))?;
                field.set(&mut current, value);
                let saved = self.saved_or(request, current).await?;
                info!(id = %saved.id, ?field, value, "toggled task");
                Ok(TaskOutcome::Saved(saved))
            }
            TaskCommand::Delete { id } => {
                self.http
                    .send(ApiRequest::delete(endpoints::delete_task(&id)))
                    .await?;
                info!(id = %id, "deleted task");
                Ok(TaskOutcome::Deleted(id))
            }
        }
    }

    // Some backends answer an update or a PATCH with an empty body; keep
    // the locally changed copy then.
    async fn saved_or(&self, request: ApiRequest, edited: Task) -> Result<Task, ApiError> {
        let body = self.http.send(request).await?;
        if body.is_null() {
            return Ok(edited);
        }
        let dto: TaskDto = serde_json::from_value(body)?;
        Ok(Task::from_dto(dto, self.zone))
    }
}
