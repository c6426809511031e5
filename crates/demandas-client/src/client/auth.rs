use serde::Serialize;
use serde_json::Value;

use super::{ClientEvent, DemandasClient, actions};
use crate::bridge::Payload;
use crate::error::{ClientError, Result};
use crate::model::User;
use crate::session::UserSession;
use crate::validation::{ValidationError, normalize_email};

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    senha: &'a str,
}

impl DemandasClient {
    pub async fn login(&self, email: &str, senha: &str) -> Result<UserSession> {
        let email = normalize_email(email)?;
        if senha.is_empty() {
            return Err(ValidationError::EmptyPassword.into());
        }

        let payload = Payload::flattened(&LoginRequest {
            email: &email,
            senha,
        })?;
        let result = self.call(actions::LOGIN, payload).await?;

        let user_value = result
            .field("usuario")
            .or_else(|| result.field("user"))
            .or_else(|| result.payload())
            .cloned()
            .unwrap_or(Value::Null);
        let usuario = parse_user(user_value, &email)?;

        let session = UserSession::started_now(usuario);
        self.session.save(session.clone())?;
        tracing::info!(email = %session.usuario.email, "logged in");
        self.emit(ClientEvent::SessionChanged {
            email: Some(session.usuario.email.clone()),
        });
        Ok(session)
    }

    pub fn logout(&self) -> Result<()> {
        let had_session = self.session.current().is_some();
        self.session.clear()?;
        if had_session {
            self.emit(ClientEvent::SessionChanged { email: None });
        }
        Ok(())
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.session.current().map(|session| session.usuario)
    }
}

/// The backend may omit the email it was just given; fill it in.
fn parse_user(value: Value, email: &str) -> Result<User> {
    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(ClientError::unexpected(
                actions::LOGIN,
                format!("expected a user object, got {other}"),
            ));
        }
    };
    let has_email = object
        .get("email")
        .and_then(Value::as_str)
        .is_some_and(|value| !value.trim().is_empty());
    if !has_email {
        object.insert("email".to_string(), Value::String(email.to_string()));
    }
    serde_json::from_value(Value::Object(object))
        .map_err(|error| ClientError::unexpected(actions::LOGIN, error.to_string()))
}
