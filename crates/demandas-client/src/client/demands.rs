use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::{ClientEvent, DemandasClient, actions, expect_success, today};
use crate::bridge::Payload;
use crate::error::{ClientError, Result};
use crate::model::{Demand, DemandDraft, DemandPatch, DemandStats, Fetched};
use crate::response::RemoteResult;
use crate::validation::{ValidationError, validate_deadline};

pub const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// `(local id, id assigned by the backend)`.
    pub synced: Vec<(String, String)>,
    /// `(local id, reason)`; these stay in the cache for the next attempt.
    pub failed: Vec<(String, String)>,
    /// Local ids the backend accepted without naming the new id. The local copy
    /// is dropped so a later sync does not submit them again; the next listing
    /// brings back the backend's record.
    pub unconfirmed: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    titulo: &'a str,
    descricao: &'a str,
    escolas: Vec<&'a str>,
    responsavel: &'a str,
    prazo: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    prioridade: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    criado_por: Option<&'a str>,
}

impl<'a> CreateRequest<'a> {
    fn new(draft: &'a DemandDraft, prazo: NaiveDate, criado_por: Option<&'a str>) -> Self {
        Self {
            titulo: draft.titulo.trim(),
            descricao: draft.descricao.trim(),
            escolas: draft
                .escolas
                .iter()
                .map(|escola| escola.trim())
                .filter(|escola| !escola.is_empty())
                .collect(),
            responsavel: draft.responsavel.trim(),
            prazo,
            prioridade: draft.prioridade.as_deref(),
            criado_por,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id: &'a str,
    #[serde(flatten)]
    patch: &'a DemandPatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    atualizado_por: Option<&'a str>,
}

pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

impl DemandasClient {
    /// Lists the signed-in user's demands, answering from the cache when the
    /// backend cannot be reached.
    pub async fn list_demands(&self) -> Result<Fetched<Vec<Demand>>> {
        let session = self.session.require()?;
        let payload = Payload::json(&ListRequest {
            email: &session.usuario.email,
        })?;

        let result = match self.bridge.invoke(actions::LISTAR_DEMANDAS, payload).await {
            Ok(result) => expect_success(actions::LISTAR_DEMANDAS, result)?,
            Err(error) if error.is_recoverable() => {
                let cached = self.cache.load_demands().unwrap_or_else(|store_error| {
                    tracing::warn!(reason = %store_error, "demand cache unreadable; ignoring it");
                    None
                });
                let Some(cached) = cached else {
                    return Err(error.into());
                };
                tracing::warn!(
                    reason = %error,
                    cached = cached.len(),
                    "listing demands offline from cache"
                );
                self.emit(ClientEvent::DemandsRefreshed {
                    total: cached.len(),
                    offline: true,
                });
                return Ok(Fetched::offline(cached));
            }
            Err(error) => return Err(error.into()),
        };

        let mut demands = parse_demand_list(result)?;
        let local = self.cache.unsynced()?;
        for pending in local {
            if !demands.iter().any(|demand| demand.id == pending.id) {
                demands.push(pending);
            }
        }

        self.cache.save_demands(&demands)?;
        self.cache
            .save_stats(&DemandStats::from_demands(&demands, today()))?;
        tracing::debug!(total = demands.len(), "demand list refreshed");
        self.emit(ClientEvent::DemandsRefreshed {
            total: demands.len(),
            offline: false,
        });
        Ok(Fetched::remote(demands))
    }

    /// Validates locally, then submits. When the backend cannot be reached the
    /// demand is kept in the cache under a local id until `sync_pending`.
    pub async fn create_demand(&self, draft: DemandDraft) -> Result<Fetched<Demand>> {
        let prazo = draft.validate(today())?;
        let session = self.session.require()?;
        let criado_por = session.usuario.email;

        let payload = Payload::json(&CreateRequest::new(&draft, prazo, Some(criado_por.as_str())))?;
        match self.bridge.invoke(actions::CRIAR_DEMANDA, payload).await {
            Ok(result) => {
                let result = expect_success(actions::CRIAR_DEMANDA, result)?;
                let demand = created_demand(&result, draft, prazo, &criado_por)?;
                self.cache.upsert_demand(&demand)?;
                tracing::info!(demand_id = %demand.id, "demand created");
                self.emit(ClientEvent::DemandCreated {
                    demand: demand.clone(),
                    offline: false,
                });
                Ok(Fetched::remote(demand))
            }
            Err(error) if error.is_recoverable() => {
                let local_id = format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4().simple());
                let mut demand = draft.into_demand(local_id, prazo, Some(criado_por));
                demand.sincronizado = false;
                self.cache.upsert_demand(&demand)?;
                tracing::warn!(
                    reason = %error,
                    demand_id = %demand.id,
                    "demand stored locally until the backend is reachable"
                );
                self.emit(ClientEvent::DemandCreated {
                    demand: demand.clone(),
                    offline: true,
                });
                Ok(Fetched::offline(demand))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Failures are surfaced; there is no offline path for updates of synced
    /// demands. Local-only demands are edited in the cache.
    pub async fn update_demand(&self, id: &str, patch: DemandPatch) -> Result<Option<Demand>> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ValidationError::EmptyDemandId.into());
        }
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }
        if patch.prazo.is_some() {
            validate_deadline(patch.prazo, today())?;
        }
        if let Some(status) = patch.status.as_ref().filter(|status| !status.is_known()) {
            return Err(ValidationError::UnknownStatus(status.as_str().to_string()).into());
        }

        if is_local_id(id) {
            let Some(mut demand) = self.cached_demand(id)? else {
                return Err(ClientError::UnknownDemand { id: id.to_string() });
            };
            patch.apply_to(&mut demand);
            self.cache.upsert_demand(&demand)?;
            self.emit(ClientEvent::DemandUpdated {
                demand_id: id.to_string(),
            });
            return Ok(Some(demand));
        }

        let email = self.session.email();
        let payload = Payload::flattened(&UpdateRequest {
            id,
            patch: &patch,
            atualizado_por: email.as_deref(),
        })?;
        self.call(actions::ATUALIZAR_DEMANDA, payload).await?;

        let updated = match self.cached_demand(id)? {
            Some(mut demand) => {
                patch.apply_to(&mut demand);
                self.cache.upsert_demand(&demand)?;
                Some(demand)
            }
            None => None,
        };
        tracing::info!(demand_id = id, "demand updated");
        self.emit(ClientEvent::DemandUpdated {
            demand_id: id.to_string(),
        });
        Ok(updated)
    }

    /// Demands created while offline and not yet accepted by the backend.
    pub fn pending_sync(&self) -> Result<Vec<Demand>> {
        Ok(self.cache.unsynced()?)
    }

    /// Resubmits locally stored demands. Stops at the first timeout or network
    /// failure; backend rejections are recorded and the rest still attempted.
    /// A success without a readable id lands in `unconfirmed`, not `failed`.
    pub async fn sync_pending(&self) -> Result<SyncReport> {
        let pending = self.cache.unsynced()?;
        let mut report = SyncReport::default();

        for (index, local) in pending.iter().enumerate() {
            let draft = DemandDraft::from(local);
            let criado_por = local.criado_por.clone().or_else(|| self.session.email());
            let payload = Payload::json(&CreateRequest::new(
                &draft,
                local.prazo,
                criado_por.as_deref(),
            ))?;

            let result = match self.bridge.invoke(actions::CRIAR_DEMANDA, payload).await {
                Ok(result) => expect_success(actions::CRIAR_DEMANDA, result),
                Err(error) if error.is_recoverable() => {
                    tracing::warn!(reason = %error, "sync interrupted; backend unreachable");
                    report.failed.extend(
                        pending[index..]
                            .iter()
                            .map(|demand| (demand.id.clone(), error.to_string())),
                    );
                    break;
                }
                Err(error) => Err(error.into()),
            };

            let accepted = match result {
                Ok(accepted) => accepted,
                Err(error) => {
                    tracing::warn!(local_id = %local.id, reason = %error, "demand sync rejected");
                    report.failed.push((local.id.clone(), error.to_string()));
                    continue;
                }
            };

            let synced = created_demand(
                &accepted,
                draft,
                local.prazo,
                criado_por.as_deref().unwrap_or(""),
            );
            match synced {
                Ok(mut demand) => {
                    demand.status = local.status.clone();
                    demand.observacao.clone_from(&local.observacao);
                    self.cache.remove_demand(&local.id)?;
                    self.cache.upsert_demand(&demand)?;
                    tracing::info!(local_id = %local.id, demand_id = %demand.id, "demand synced");
                    report.synced.push((local.id.clone(), demand.id.clone()));
                    self.emit(ClientEvent::DemandCreated {
                        demand,
                        offline: false,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        local_id = %local.id,
                        reason = %error,
                        "demand accepted without an id; dropping local copy"
                    );
                    self.cache.remove_demand(&local.id)?;
                    report.unconfirmed.push(local.id.clone());
                }
            }
        }
        Ok(report)
    }

    /// Counters saved by the last successful listing.
    pub fn cached_stats(&self) -> Result<Option<DemandStats>> {
        Ok(self.cache.load_stats()?)
    }

    fn cached_demand(&self, id: &str) -> Result<Option<Demand>> {
        Ok(self
            .cache
            .load_demands()?
            .unwrap_or_default()
            .into_iter()
            .find(|demand| demand.id == id))
    }
}

fn parse_demand_list(result: RemoteResult) -> Result<Vec<Demand>> {
    let items = result.into_items("demandas").ok_or_else(|| {
        ClientError::unexpected(actions::LISTAR_DEMANDAS, "answer carries no demand list")
    })?;

    let mut demands = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Demand>(item) {
            Ok(demand) => demands.push(demand),
            Err(error) => {
                tracing::warn!(reason = %error, "skipping unreadable demand record");
            }
        }
    }
    Ok(demands)
}

/// Prefers a full record in the answer; otherwise builds one from the draft
/// and the id the backend assigned.
fn created_demand(
    result: &RemoteResult,
    draft: DemandDraft,
    prazo: NaiveDate,
    criado_por: &str,
) -> Result<Demand> {
    if let Some(record) = result.field("demanda")
        && let Ok(demand) = serde_json::from_value::<Demand>(record.clone())
    {
        return Ok(demand);
    }

    let id = match result.field("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        Some(Value::Number(id)) => id.to_string(),
        _ => {
            return Err(ClientError::unexpected(
                actions::CRIAR_DEMANDA,
                "answer carries no demand id",
            ));
        }
    };
    let criado_por = Some(criado_por.to_string()).filter(|email| !email.is_empty());
    Ok(draft.into_demand(id, prazo, criado_por))
}
