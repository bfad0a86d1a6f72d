//! AWS instance identity verification
//!
//! The metadata document is the base64 encoded pair of the instance identity
//! document and its PKCS7 signature, as served by IMDS.

use super::{
    decode_json_document, parse_addresses, parse_response, InstanceProvider, ProviderVerdict,
};
use crate::{CloudProvider, FailureReason};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub struct AwsProvider;

/// Signed document as sent by the instance
#[derive(Debug, Deserialize)]
struct SignedDocument {
    document: String,
    signature: String,
}

/// Instance identity document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    pub instance_id: String,
    pub account_id: String,
    pub region: String,
    #[serde(default)]
    pub billing_products: Vec<String>,
    #[serde(default)]
    pub marketplace_product_codes: Vec<String>,
}

/// Verifier response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    valid: bool,
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    billing_products: Vec<String>,
    #[serde(default)]
    marketplace_product_codes: Vec<String>,
    #[serde(default)]
    public_ip: Option<String>,
    #[serde(default)]
    private_ip: Option<String>,
}

impl InstanceProvider for AwsProvider {
    fn kind(&self) -> CloudProvider {
        CloudProvider::Aws
    }

    fn prepare(&self, document: &str) -> Result<serde_json::Value, FailureReason> {
        let signed: SignedDocument = decode_json_document(document)?;
        if signed.signature.trim().is_empty() {
            return Err(FailureReason::MalformedDocument);
        }

        let identity: IdentityDocument =
            serde_json::from_str(&signed.document).map_err(|_| FailureReason::MalformedDocument)?;
        if identity.instance_id.is_empty() || identity.account_id.is_empty() {
            return Err(FailureReason::MalformedDocument);
        }

        Ok(json!({
            "document": signed.document,
            "signature": signed.signature,
            "instanceId": identity.instance_id,
            "region": identity.region,
            "billingProducts": identity.billing_products,
            "marketplaceProductCodes": identity.marketplace_product_codes,
        }))
    }

    fn interpret(&self, body: &[u8]) -> Result<ProviderVerdict, FailureReason> {
        let response: VerifyResponse = parse_response(self.kind(), body)?;

        let billing_account_id = response
            .billing_products
            .first()
            .or(response.marketplace_product_codes.first())
            .cloned()
            .or(response.account_id);

        let addresses: Vec<String> = response
            .public_ip
            .into_iter()
            .chain(response.private_ip)
            .collect();

        Ok(ProviderVerdict {
            accepted: response.valid,
            billing_account_id,
            instance_addresses: parse_addresses(&addresses),
        })
    }
}
