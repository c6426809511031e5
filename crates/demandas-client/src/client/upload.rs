use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use super::{ClientEvent, DemandasClient, actions, expect_success};
use crate::bridge::{CallMethod, CallOptions, Payload};
use crate::error::{ClientError, Result};
use crate::response::RemoteResult;
use crate::validation::validate_upload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub nome: String,
    pub url: String,
    pub id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    nome: &'a str,
    mime_type: &'a str,
    conteudo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    demanda_id: Option<&'a str>,
}

impl DemandasClient {
    /// Sends `bytes` base64-encoded in a form body. Size is checked before
    /// anything is encoded.
    pub async fn upload_file(
        &self,
        nome: &str,
        mime_type: &str,
        bytes: &[u8],
        demanda_id: Option<&str>,
    ) -> Result<UploadedFile> {
        validate_upload(nome, bytes.len())?;
        let nome = nome.trim();
        let mime_type = match mime_type.trim() {
            "" => "application/octet-stream",
            other => other,
        };

        let payload = Payload::flattened(&UploadRequest {
            nome,
            mime_type,
            conteudo: STANDARD.encode(bytes),
            demanda_id,
        })?;
        let options = CallOptions::new(self.upload_timeout).with_method(CallMethod::Post);
        let result = self
            .bridge
            .invoke_with(actions::UPLOAD_ARQUIVO, payload, options)
            .await?;
        let result = expect_success(actions::UPLOAD_ARQUIVO, result)?;

        let uploaded = uploaded_file(&result, nome)?;
        tracing::info!(nome, size = bytes.len(), url = %uploaded.url, "file uploaded");
        self.emit(ClientEvent::FileUploaded {
            nome: uploaded.nome.clone(),
            url: uploaded.url.clone(),
        });
        Ok(uploaded)
    }
}

fn uploaded_file(result: &RemoteResult, nome: &str) -> Result<UploadedFile> {
    let url = ["url", "fileUrl", "link"]
        .iter()
        .find_map(|field| result.str_field(field))
        .ok_or_else(|| ClientError::unexpected(actions::UPLOAD_ARQUIVO, "answer carries no file url"))?;
    let id = result
        .str_field("fileId")
        .or_else(|| result.str_field("id"))
        .map(str::to_string);
    Ok(UploadedFile {
        nome: nome.to_string(),
        url: url.to_string(),
        id,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn url_is_read_from_any_known_field() {
        let result = RemoteResult::from_value(json!({
            "success": true,
            "data": {"fileUrl": "https://drive.example.com/f/1", "fileId": "1"}
        }));
        let uploaded = uploaded_file(&result, "ata.pdf").expect("uploaded");
        assert_eq!(uploaded.url, "https://drive.example.com/f/1");
        assert_eq!(uploaded.id.as_deref(), Some("1"));
    }

    #[test]
    fn missing_url_is_unexpected() {
        let result = RemoteResult::from_value(json!({"success": true}));
        assert!(matches!(
            uploaded_file(&result, "ata.pdf"),
            Err(ClientError::UnexpectedResponse { .. })
        ));
    }
}
