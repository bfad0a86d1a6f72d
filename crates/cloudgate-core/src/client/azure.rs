//! Azure attested metadata verification

use super::{
    decode_json_document, parse_addresses, parse_response, InstanceProvider, ProviderVerdict,
};
use crate::{CloudProvider, FailureReason};
use serde::Deserialize;
use serde_json::json;

pub struct AzureProvider;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttestedDocument {
    vm_id: String,
    signature: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    status: String,
    #[serde(default)]
    subscription_id: Option<String>,
    #[serde(default)]
    plan_id: Option<String>,
    #[serde(default)]
    ip_addresses: Vec<String>,
}

impl InstanceProvider for AzureProvider {
    fn kind(&self) -> CloudProvider {
        CloudProvider::Azure
    }

    fn prepare(&self, document: &str) -> Result<serde_json::Value, FailureReason> {
        let attested: AttestedDocument = decode_json_document(document)?;
        if attested.vm_id.trim().is_empty() || attested.signature.trim().is_empty() {
            return Err(FailureReason::MalformedDocument);
        }
        if let Some(encoding) = attested.encoding.as_deref() {
            if !encoding.eq_ignore_ascii_case("pkcs7") {
                return Err(FailureReason::MalformedDocument);
            }
        }

        Ok(json!({
            "vmId": attested.vm_id,
            "signature": attested.signature,
            "encoding": "pkcs7",
        }))
    }

    fn interpret(&self, body: &[u8]) -> Result<ProviderVerdict, FailureReason> {
        let response: VerifyResponse = parse_response(self.kind(), body)?;

        Ok(ProviderVerdict {
            accepted: response.status.eq_ignore_ascii_case("valid"),
            billing_account_id: response.plan_id.or(response.subscription_id),
            instance_addresses: parse_addresses(&response.ip_addresses),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    #[test]
    fn test_prepare() {
        let document = STANDARD.encode(
            json!({ "vmId": "02aab8a4-74ef-476e-8182-f6d2ba4166a6", "signature": "MIID" })
                .to_string(),
        );
        let payload = AzureProvider.prepare(&document).unwrap();
        assert_eq!(payload["encoding"], "pkcs7");
    }

    #[test]
    fn test_prepare_rejects_unknown_encoding() {
        let document = STANDARD.encode(
            json!({ "vmId": "vm", "signature": "MIID", "encoding": "jws" }).to_string(),
        );
        assert_eq!(AzureProvider.prepare(&document), Err(FailureReason::MalformedDocument));
    }

    #[test]
    fn test_interpret() {
        let body = json!({
            "status": "Valid",
            "subscriptionId": "8d10da13-8125-4ba9-a717-bf7490507b3d",
            "planId": "sles-15-sp5-payg",
            "ipAddresses": ["20.1.2.3", "bogus"]
        });
        let verdict = AzureProvider.interpret(body.to_string().as_bytes()).unwrap();
        assert!(verdict.accepted);
        assert_eq!(verdict.billing_account_id.as_deref(), Some("sles-15-sp5-payg"));
        assert_eq!(verdict.instance_addresses.len(), 1);
    }

    #[test]
    fn test_interpret_invalid_status() {
        let body = json!({ "status": "invalid" });
        let verdict = AzureProvider.interpret(body.to_string().as_bytes()).unwrap();
        assert!(!verdict.accepted);
    }
}
