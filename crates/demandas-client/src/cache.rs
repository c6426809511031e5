use std::sync::Arc;

use crate::model::{Demand, DemandStats, PushSubscription};
use crate::store::{KeyValueStore, StoreError, keys, load_json, save_json};

/// Typed view over the demand-related keys of the local store.
#[derive(Debug, Clone)]
pub struct DemandCache {
    store: Arc<dyn KeyValueStore>,
}

impl DemandCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load_demands(&self) -> Result<Option<Vec<Demand>>, StoreError> {
        load_json(self.store.as_ref(), keys::CACHE)
    }

    pub fn save_demands(&self, demands: &[Demand]) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), keys::CACHE, demands)
    }

    /// Replaces the entry with the same id, or appends.
    pub fn upsert_demand(&self, demand: &Demand) -> Result<(), StoreError> {
        let mut demands = self.load_demands()?.unwrap_or_default();
        match demands.iter_mut().find(|cached| cached.id == demand.id) {
            Some(cached) => *cached = demand.clone(),
            None => demands.push(demand.clone()),
        }
        self.save_demands(&demands)
    }

    pub fn remove_demand(&self, id: &str) -> Result<bool, StoreError> {
        let mut demands = self.load_demands()?.unwrap_or_default();
        let before = demands.len();
        demands.retain(|cached| cached.id != id);
        if demands.len() == before {
            return Ok(false);
        }
        self.save_demands(&demands)?;
        Ok(true)
    }

    pub fn unsynced(&self) -> Result<Vec<Demand>, StoreError> {
        Ok(self
            .load_demands()?
            .unwrap_or_default()
            .into_iter()
            .filter(|demand| !demand.sincronizado)
            .collect())
    }

    pub fn load_stats(&self) -> Result<Option<DemandStats>, StoreError> {
        load_json(self.store.as_ref(), keys::ESTATISTICAS)
    }

    pub fn save_stats(&self, stats: &DemandStats) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), keys::ESTATISTICAS, stats)
    }

    pub fn load_subscription(&self) -> Result<Option<PushSubscription>, StoreError> {
        load_json(self.store.as_ref(), keys::PUSH_SUBSCRIPTION)
    }

    pub fn save_subscription(&self, subscription: &PushSubscription) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), keys::PUSH_SUBSCRIPTION, subscription)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::DemandDraft;
    use crate::store::MemoryStore;

    fn demand(id: &str, sincronizado: bool) -> Demand {
        let mut demand = DemandDraft {
            titulo: format!("demanda {id}"),
            descricao: "d".to_string(),
            escolas: vec!["EE Centro".to_string()],
            responsavel: "r".to_string(),
            prazo: None,
            prioridade: None,
        }
        .into_demand(
            id.to_string(),
            NaiveDate::from_ymd_opt(2026, 11, 1).expect("date"),
            None,
        );
        demand.sincronizado = sincronizado;
        demand
    }

    #[test]
    fn upsert_replaces_by_id_and_appends_new_ids() {
        let cache = DemandCache::new(Arc::new(MemoryStore::new()));
        cache.upsert_demand(&demand("1", true)).expect("upsert");
        cache.upsert_demand(&demand("2", false)).expect("upsert");

        let mut changed = demand("1", true);
        changed.titulo = "renomeada".to_string();
        cache.upsert_demand(&changed).expect("upsert");

        let cached = cache.load_demands().expect("load").expect("present");
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].titulo, "renomeada");
        assert_eq!(
            cache
                .unsynced()
                .expect("unsynced")
                .iter()
                .map(|demand| demand.id.as_str())
                .collect::<Vec<_>>(),
            ["2"]
        );
    }

    #[test]
    fn remove_reports_whether_anything_changed() {
        let cache = DemandCache::new(Arc::new(MemoryStore::new()));
        cache.upsert_demand(&demand("local-1", false)).expect("upsert");

        assert!(cache.remove_demand("local-1").expect("remove"));
        assert!(!cache.remove_demand("local-1").expect("remove"));
    }
}
