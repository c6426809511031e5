use serde::Serialize;

use super::{DemandasClient, actions, is_local_id};
use crate::bridge::Payload;
use crate::error::{ClientError, Result};
use crate::model::{Demand, PushSubscription};
use crate::validation::{normalize_email, require_text};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionRequest<'a> {
    email: &'a str,
    subscription: &'a PushSubscription,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailRequest<'a> {
    destinatario: &'a str,
    assunto: &'a str,
    mensagem: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotifyRequest<'a> {
    demanda_id: &'a str,
    titulo: &'a str,
    escolas: &'a [String],
    responsavel: &'a str,
    prazo: chrono::NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    remetente: Option<&'a str>,
}

impl DemandasClient {
    /// The subscription is cached before the call, so a failed call still
    /// leaves it available for a later attempt.
    pub async fn save_push_subscription(&self, subscription: &PushSubscription) -> Result<()> {
        require_text(&subscription.endpoint, "endpoint")?;
        let session = self.session.require()?;
        self.cache.save_subscription(subscription)?;

        let payload = Payload::json(&SubscriptionRequest {
            email: &session.usuario.email,
            subscription,
        })?;
        self.call(actions::SALVAR_SUBSCRIPTION, payload).await?;
        tracing::info!(email = %session.usuario.email, "push subscription registered");
        Ok(())
    }

    pub async fn send_email(&self, destinatario: &str, assunto: &str, mensagem: &str) -> Result<()> {
        let destinatario = normalize_email(destinatario)?;
        require_text(assunto, "assunto")?;
        require_text(mensagem, "mensagem")?;

        let payload = Payload::flattened(&EmailRequest {
            destinatario: &destinatario,
            assunto: assunto.trim(),
            mensagem,
        })?;
        self.call(actions::ENVIAR_EMAIL, payload).await?;
        tracing::info!(destinatario = %destinatario, "email sent");
        Ok(())
    }

    /// Asks the backend to push a notification about `demand` to its schools.
    /// Demands created offline must be synced first.
    pub async fn notify_demand(&self, demand: &Demand) -> Result<()> {
        require_text(&demand.id, "id")?;
        if is_local_id(&demand.id) {
            return Err(ClientError::UnknownDemand {
                id: demand.id.clone(),
            });
        }
        let remetente = self.session.email();
        let payload = Payload::json(&NotifyRequest {
            demanda_id: &demand.id,
            titulo: &demand.titulo,
            escolas: &demand.escolas,
            responsavel: &demand.responsavel,
            prazo: demand.prazo,
            remetente: remetente.as_deref(),
        })?;
        self.call(actions::ENVIAR_NOTIFICACAO, payload).await?;
        tracing::info!(demand_id = %demand.id, "notification requested");
        Ok(())
    }
}
