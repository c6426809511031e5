use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::validation::{ValidationError, require_text, validate_deadline};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub nome: String,
    #[serde(default, alias = "tipo", alias = "role")]
    pub perfil: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escola: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DemandStatus {
    #[default]
    Pendente,
    EmAndamento,
    Concluida,
    Cancelada,
    /// A status this client does not know, kept exactly as the backend sent it.
    Desconhecido(String),
}

impl DemandStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pendente => "pendente",
            Self::EmAndamento => "em_andamento",
            Self::Concluida => "concluida",
            Self::Cancelada => "cancelada",
            Self::Desconhecido(raw) => raw,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Desconhecido(_))
    }

    /// Spreadsheet cells spell statuses loosely ("Em andamento", "Concluída").
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let folded = raw
            .trim()
            .chars()
            .map(|ch| match ch {
                'á' | 'à' | 'â' | 'ã' | 'Á' | 'À' | 'Â' | 'Ã' => 'a',
                'é' | 'ê' | 'É' | 'Ê' => 'e',
                'í' | 'Í' => 'i',
                'ó' | 'ô' | 'õ' | 'Ó' | 'Ô' | 'Õ' => 'o',
                'ú' | 'Ú' => 'u',
                'ç' | 'Ç' => 'c',
                ' ' | '-' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect::<String>();
        match folded.as_str() {
            "" | "pendente" | "aberta" | "nova" => Self::Pendente,
            "em_andamento" | "emandamento" | "andamento" => Self::EmAndamento,
            "concluida" | "finalizada" => Self::Concluida,
            "cancelada" => Self::Cancelada,
            _ => Self::Desconhecido(raw.trim().to_string()),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Concluida | Self::Cancelada)
    }
}

impl From<String> for DemandStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<DemandStatus> for String {
    fn from(value: DemandStatus) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demand {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub titulo: String,
    #[serde(default)]
    pub descricao: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub escolas: Vec<String>,
    #[serde(default)]
    pub responsavel: String,
    #[serde(deserialize_with = "lenient_date")]
    pub prazo: NaiveDate,
    #[serde(default)]
    pub status: DemandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prioridade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criado_por: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criado_em: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observacao: Option<String>,
    /// False for demands only stored locally after an offline create.
    #[serde(default = "default_true")]
    pub sincronizado: bool,
}

impl Demand {
    #[must_use]
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status.is_open() && self.prazo < today
    }
}

/// A demand as typed by the user, before the backend assigns an id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandDraft {
    pub titulo: String,
    pub descricao: String,
    pub escolas: Vec<String>,
    pub responsavel: String,
    pub prazo: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prioridade: Option<String>,
}

impl DemandDraft {
    /// Checks required fields and returns the deadline.
    pub fn validate(&self, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
        require_text(&self.titulo, "titulo")?;
        require_text(&self.descricao, "descricao")?;
        if !self.escolas.iter().any(|escola| !escola.trim().is_empty()) {
            return Err(ValidationError::NoSchools);
        }
        require_text(&self.responsavel, "responsavel")?;
        validate_deadline(self.prazo, today)
    }

    #[must_use]
    pub fn into_demand(self, id: String, prazo: NaiveDate, criado_por: Option<String>) -> Demand {
        Demand {
            id,
            titulo: self.titulo.trim().to_string(),
            descricao: self.descricao.trim().to_string(),
            escolas: self
                .escolas
                .into_iter()
                .map(|escola| escola.trim().to_string())
                .filter(|escola| !escola.is_empty())
                .collect(),
            responsavel: self.responsavel.trim().to_string(),
            prazo,
            status: DemandStatus::Pendente,
            prioridade: self.prioridade,
            criado_por,
            criado_em: Some(chrono::Utc::now().to_rfc3339()),
            observacao: None,
            sincronizado: true,
        }
    }
}

impl From<&Demand> for DemandDraft {
    fn from(demand: &Demand) -> Self {
        Self {
            titulo: demand.titulo.clone(),
            descricao: demand.descricao.clone(),
            escolas: demand.escolas.clone(),
            responsavel: demand.responsavel.clone(),
            prazo: Some(demand.prazo),
            prioridade: demand.prioridade.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DemandStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsavel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prazo: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observacao: Option<String>,
}

impl DemandPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.responsavel.is_none()
            && self.prazo.is_none()
            && self.observacao.is_none()
    }

    pub fn apply_to(&self, demand: &mut Demand) {
        if let Some(status) = &self.status {
            demand.status = status.clone();
        }
        if let Some(responsavel) = &self.responsavel {
            demand.responsavel.clone_from(responsavel);
        }
        if let Some(prazo) = self.prazo {
            demand.prazo = prazo;
        }
        if let Some(observacao) = &self.observacao {
            demand.observacao = Some(observacao.clone());
        }
    }
}

/// Counters derived from the last successful listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandStats {
    pub total: usize,
    pub pendentes: usize,
    pub em_andamento: usize,
    pub concluidas: usize,
    pub atrasadas: usize,
}

impl DemandStats {
    #[must_use]
    pub fn from_demands(demands: &[Demand], today: NaiveDate) -> Self {
        let mut stats = Self {
            total: demands.len(),
            ..Self::default()
        };
        for demand in demands {
            match &demand.status {
                DemandStatus::Pendente => stats.pendentes += 1,
                DemandStatus::EmAndamento => stats.em_andamento += 1,
                DemandStatus::Concluida => stats.concluidas += 1,
                DemandStatus::Cancelada | DemandStatus::Desconhecido(_) => {}
            }
            if demand.is_overdue(today) {
                stats.atrasadas += 1;
            }
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
    pub keys: PushKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Remote,
    /// Served from the local cache after a failed remote call.
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub origin: Origin,
}

impl<T> Fetched<T> {
    pub fn remote(value: T) -> Self {
        Self {
            value,
            origin: Origin::Remote,
        }
    }

    pub fn offline(value: T) -> Self {
        Self {
            value,
            origin: Origin::Offline,
        }
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.origin == Origin::Offline
    }
}

fn default_true() -> bool {
    true
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text.trim().to_string(),
        RawId::Number(number) => number.to_string(),
    })
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawList {
        Items(Vec<String>),
        Joined(String),
        Missing(()),
    }

    let items = match RawList::deserialize(deserializer)? {
        RawList::Items(items) => items,
        RawList::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        RawList::Missing(()) => Vec::new(),
    };
    Ok(items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

/// Accepts `YYYY-MM-DD` or a timestamp whose first ten characters are that date.
fn lenient_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|error| {
        serde::de::Error::custom(format!("invalid date `{trimmed}`: {error}"))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn demand_accepts_spreadsheet_shapes() {
        let demand: Demand = serde_json::from_value(json!({
            "id": 17,
            "titulo": "Troca de lâmpadas",
            "descricao": "Bloco B",
            "escolas": "EE Norte, EE Sul ,",
            "responsavel": "Zeladoria",
            "prazo": "2026-11-03T03:00:00.000Z",
            "status": "Em andamento",
            "criadoPor": "diretora@escola.org"
        }))
        .expect("demand");

        assert_eq!(demand.id, "17");
        assert_eq!(demand.escolas, ["EE Norte", "EE Sul"]);
        assert_eq!(demand.prazo, date(2026, 11, 3));
        assert_eq!(demand.status, DemandStatus::EmAndamento);
        assert_eq!(demand.criado_por.as_deref(), Some("diretora@escola.org"));
        assert!(demand.sincronizado);
    }

    #[test]
    fn status_parsing_folds_accents_and_spacing() {
        assert_eq!(DemandStatus::parse("Concluída"), DemandStatus::Concluida);
        assert_eq!(DemandStatus::parse("em-andamento"), DemandStatus::EmAndamento);
        assert_eq!(DemandStatus::parse(""), DemandStatus::Pendente);
        assert_eq!(
            DemandStatus::parse(" Arquivada "),
            DemandStatus::Desconhecido("Arquivada".to_string())
        );
        assert_eq!(
            serde_json::to_value(DemandStatus::EmAndamento).expect("serialize"),
            json!("em_andamento")
        );
    }

    #[test]
    fn unknown_status_survives_a_cache_round_trip() {
        let demand: Demand = serde_json::from_value(json!({
            "id": 4,
            "titulo": "Arquivo",
            "prazo": "2026-11-03",
            "status": "arquivada"
        }))
        .expect("demand");
        assert!(!demand.status.is_known());

        let stored = serde_json::to_value(&demand).expect("serialize");
        assert_eq!(stored["status"], json!("arquivada"));
        let reread: Demand = serde_json::from_value(stored).expect("reread");
        assert_eq!(reread.status, DemandStatus::Desconhecido("arquivada".to_string()));
    }

    #[test]
    fn draft_requires_every_field() {
        let today = date(2026, 10, 19);
        let complete = DemandDraft {
            titulo: "Reforma".to_string(),
            descricao: "Quadra".to_string(),
            escolas: vec!["EE Norte".to_string()],
            responsavel: "Obras".to_string(),
            prazo: Some(today),
            prioridade: None,
        };
        assert_eq!(complete.validate(today), Ok(today));

        let no_title = DemandDraft {
            titulo: " ".to_string(),
            ..complete.clone()
        };
        assert_eq!(
            no_title.validate(today),
            Err(ValidationError::MissingField("titulo"))
        );

        let blank_schools = DemandDraft {
            escolas: vec!["  ".to_string()],
            ..complete.clone()
        };
        assert_eq!(blank_schools.validate(today), Err(ValidationError::NoSchools));

        let no_owner = DemandDraft {
            responsavel: String::new(),
            ..complete
        };
        assert_eq!(
            no_owner.validate(today),
            Err(ValidationError::MissingField("responsavel"))
        );
    }

    #[test]
    fn stats_count_statuses_and_overdue_open_items() {
        let today = date(2026, 10, 19);
        let base = DemandDraft {
            titulo: "t".to_string(),
            descricao: "d".to_string(),
            escolas: vec!["e".to_string()],
            responsavel: "r".to_string(),
            prazo: None,
            prioridade: None,
        };
        let mut late = base.clone().into_demand("1".to_string(), date(2026, 10, 1), None);
        late.status = DemandStatus::EmAndamento;
        let mut done_late = base.clone().into_demand("2".to_string(), date(2026, 9, 1), None);
        done_late.status = DemandStatus::Concluida;
        let upcoming = base.into_demand("3".to_string(), date(2026, 12, 1), None);

        let stats = DemandStats::from_demands(&[late, done_late, upcoming], today);
        assert_eq!(
            stats,
            DemandStats {
                total: 3,
                pendentes: 1,
                em_andamento: 1,
                concluidas: 1,
                atrasadas: 1,
            }
        );
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut demand = DemandDraft {
            titulo: "t".to_string(),
            descricao: "d".to_string(),
            escolas: vec!["e".to_string()],
            responsavel: "antes".to_string(),
            prazo: None,
            prioridade: None,
        }
        .into_demand("9".to_string(), date(2026, 10, 30), None);

        let patch = DemandPatch {
            status: Some(DemandStatus::Concluida),
            ..DemandPatch::default()
        };
        assert!(!patch.is_empty());
        patch.apply_to(&mut demand);

        assert_eq!(demand.status, DemandStatus::Concluida);
        assert_eq!(demand.responsavel, "antes");
        assert!(DemandPatch::default().is_empty());
    }
}
