//! Built-in operations of the transactional API.
//!
//! Payloads use the wire's camelCase JSON; path identifiers (payment id,
//! refund id, original operation id) are drawn from the chain context, which
//! is where step dependencies are actually consumed.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::{Operation, OperationCatalog, OperationDescriptor, OperationKind, RequestContext};
use crate::api::{ApiRequest, ApiResponse};
use crate::chain::ChainStep;
use crate::conversion::AmountData;
use crate::core::errors::Result;

pub(super) fn register_builtin(catalog: &mut OperationCatalog) -> Result<()> {
    catalog.register(Arc::new(CreatePayment))?;
    catalog.register(Arc::new(IncrementPayment))?;
    catalog.register(Arc::new(CapturePayment))?;
    catalog.register(Arc::new(RefundPayment))?;
    catalog.register(Arc::new(GetPayment))?;
    catalog.register(Arc::new(GetRefund))?;
    catalog.register(Arc::new(ReverseAuthorization))?;
    catalog.register(Arc::new(StandaloneRefund))?;
    catalog.register(Arc::new(CaptureRefund))?;
    catalog.register(Arc::new(ReverseRefundAuthorization))?;
    catalog.register(Arc::new(TechnicalReversal))?;
    catalog.register(Arc::new(AccountVerification))?;
    catalog.register(Arc::new(Ping))?;
    catalog.register(Arc::new(RateInquiry))?;
    Ok(())
}

fn random_suffix(length: usize) -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(length)
        .collect()
}

/// Operation ids are capped at 40 characters by the API; the test id is
/// padded with a random suffix up to that limit.
fn operation_id(step: &ChainStep) -> String {
    let test_id = step.test_id();
    let remaining = 40usize.saturating_sub(test_id.len() + 1).max(8);
    format!("{}-{}", test_id, random_suffix(remaining))
}

fn merchant_reference(step: &ChainStep) -> String {
    let test_id = step.test_id();
    let remaining = 50usize.saturating_sub(test_id.len() + 1).max(8);
    format!("{}-{}", test_id, random_suffix(remaining))
}

fn transaction_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn merchant_path(step: &ChainStep, tail: &str) -> anyhow::Result<String> {
    let acquirer = step
        .param_str("acquirer_id")
        .ok_or_else(|| anyhow::anyhow!("missing 'acquirer_id' parameter"))?;
    let merchant = step
        .param_str("merchant_id")
        .ok_or_else(|| anyhow::anyhow!("missing 'merchant_id' parameter"))?;
    Ok(format!("/processing/v1/{}/{}/{}", acquirer, merchant, tail))
}

fn context_id(ctx: &RequestContext<'_>, key: &str) -> anyhow::Result<String> {
    ctx.outputs
        .get_str(key)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("'{}' not present in chain context", key))
}

/// Wire amount for an amount-bearing step: the conversion's resulting
/// amount when an inquiry has run, else the step's declared amount.
fn transaction_amount(step: &ChainStep, ctx: &RequestContext<'_>) -> anyhow::Result<AmountData> {
    let amount = step
        .param_i64("amount")
        .ok_or_else(|| anyhow::anyhow!("missing 'amount' parameter"))?;
    let currency = step
        .param_str("currency")
        .ok_or_else(|| anyhow::anyhow!("missing 'currency' parameter"))?;
    Ok(ctx.conversion.resolved_amount(amount, currency))
}

/// Conversion block attached to payment/refund payloads once a rate
/// inquiry has produced a reference.
fn conversion_block(ctx: &RequestContext<'_>) -> Option<Value> {
    let rate_reference_id = ctx.conversion.rate_reference_id.as_ref()?;
    let mut block = json!({ "rateReferenceId": rate_reference_id });
    if let Some(rate) = ctx.conversion.exchange_rate {
        block["conversionRate"] = json!(rate);
    }
    Some(block)
}

fn merchant_schema(extra_required: &[&str]) -> Value {
    let mut required = vec!["acquirer_id", "merchant_id"];
    required.extend_from_slice(extra_required);
    json!({
        "type": "object",
        "required": required,
        "properties": {
            "acquirer_id": {"type": "string"},
            "merchant_id": {"type": "string"},
            "amount": {"type": "integer"},
            "currency": {"type": "string"}
        }
    })
}

pub struct CreatePayment;

#[async_trait::async_trait]
impl Operation for CreatePayment {
    fn kind(&self) -> OperationKind {
        OperationKind::CreatePayment
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&[], &["payment_id"], true)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&["amount", "currency"])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let mut payload = json!({
            "operationId": operation_id(step),
            "amount": transaction_amount(step, ctx)?,
            "transactionTimestamp": transaction_timestamp(),
            "references": { "merchantReference": merchant_reference(step) },
        });
        if let Some(card) = step.params.get("card") {
            payload["cardPaymentData"] = card.clone();
        }
        if let Some(authorization_type) = step.param_str("authorization_type") {
            payload["authorizationType"] = json!(authorization_type);
        }
        if let Some(conversion) = conversion_block(ctx) {
            payload["dynamicCurrencyConversion"] = conversion;
        }
        Ok(ApiRequest::post(merchant_path(step, "payments")?, payload))
    }

    fn extract_outputs(&self, response: &ApiResponse) -> HashMap<String, Value> {
        let mut outputs = HashMap::new();
        if let Some(payment_id) = response.body.get("paymentId") {
            outputs.insert("payment_id".to_string(), payment_id.clone());
        }
        outputs
    }
}

pub struct IncrementPayment;

#[async_trait::async_trait]
impl Operation for IncrementPayment {
    fn kind(&self) -> OperationKind {
        OperationKind::IncrementPayment
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&["payment_id"], &[], true)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&["amount", "currency"])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let payment_id = context_id(ctx, "payment_id")?;
        let mut payload = json!({
            "operationId": operation_id(step),
            "incrementAmount": transaction_amount(step, ctx)?,
            "transactionTimestamp": transaction_timestamp(),
        });
        if let Some(conversion) = conversion_block(ctx) {
            payload["dynamicCurrencyConversion"] = conversion;
        }
        Ok(ApiRequest::post(
            merchant_path(step, &format!("payments/{}/increments", payment_id))?,
            payload,
        ))
    }
}

pub struct CapturePayment;

#[async_trait::async_trait]
impl Operation for CapturePayment {
    fn kind(&self) -> OperationKind {
        OperationKind::CapturePayment
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&["payment_id"], &[], true)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&["amount", "currency"])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let payment_id = context_id(ctx, "payment_id")?;
        let mut payload = json!({
            "operationId": operation_id(step),
            "amount": transaction_amount(step, ctx)?,
            "transactionTimestamp": transaction_timestamp(),
            "references": { "merchantReference": merchant_reference(step) },
        });
        if let Some(conversion) = conversion_block(ctx) {
            payload["dynamicCurrencyConversion"] = conversion;
        }
        Ok(ApiRequest::post(
            merchant_path(step, &format!("payments/{}/captures", payment_id))?,
            payload,
        ))
    }
}

pub struct RefundPayment;

#[async_trait::async_trait]
impl Operation for RefundPayment {
    fn kind(&self) -> OperationKind {
        OperationKind::RefundPayment
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&["payment_id"], &["refund_id"], true)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&["amount", "currency"])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let payment_id = context_id(ctx, "payment_id")?;
        let mut payload = json!({
            "operationId": operation_id(step),
            "amount": transaction_amount(step, ctx)?,
            "transactionTimestamp": transaction_timestamp(),
        });
        if let Some(conversion) = conversion_block(ctx) {
            payload["dynamicCurrencyConversion"] = conversion;
        }
        Ok(ApiRequest::post(
            merchant_path(step, &format!("payments/{}/refunds", payment_id))?,
            payload,
        ))
    }

    // The refund id lives in a nested object on this response.
    fn extract_outputs(&self, response: &ApiResponse) -> HashMap<String, Value> {
        let mut outputs = HashMap::new();
        if let Some(refund_id) = response.body.pointer("/refund/refundId") {
            outputs.insert("refund_id".to_string(), refund_id.clone());
        }
        outputs
    }
}

pub struct GetPayment;

#[async_trait::async_trait]
impl Operation for GetPayment {
    fn kind(&self) -> OperationKind {
        OperationKind::GetPayment
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&["payment_id"], &[], false)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&[])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let payment_id = context_id(ctx, "payment_id")?;
        Ok(ApiRequest::get(merchant_path(
            step,
            &format!("payments/{}", payment_id),
        )?))
    }
}

pub struct GetRefund;

#[async_trait::async_trait]
impl Operation for GetRefund {
    fn kind(&self) -> OperationKind {
        OperationKind::GetRefund
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&["refund_id"], &[], false)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&[])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let refund_id = context_id(ctx, "refund_id")?;
        Ok(ApiRequest::get(merchant_path(
            step,
            &format!("refunds/{}", refund_id),
        )?))
    }
}

pub struct ReverseAuthorization;

#[async_trait::async_trait]
impl Operation for ReverseAuthorization {
    fn kind(&self) -> OperationKind {
        OperationKind::ReverseAuthorization
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&["payment_id"], &[], true)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&[])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let payment_id = context_id(ctx, "payment_id")?;
        let mut payload = json!({
            "operationId": operation_id(step),
            "transactionTimestamp": transaction_timestamp(),
        });
        // Partial reversals carry an amount; full reversals omit it.
        if step.param_i64("amount").is_some() {
            payload["reversalAmount"] = json!(transaction_amount(step, ctx)?);
        }
        Ok(ApiRequest::post(
            merchant_path(
                step,
                &format!("payments/{}/authorization-reversals", payment_id),
            )?,
            payload,
        ))
    }
}

pub struct StandaloneRefund;

#[async_trait::async_trait]
impl Operation for StandaloneRefund {
    fn kind(&self) -> OperationKind {
        OperationKind::StandaloneRefund
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&[], &["refund_id"], true)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&["amount", "currency"])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let mut payload = json!({
            "operationId": operation_id(step),
            "amount": transaction_amount(step, ctx)?,
            "transactionTimestamp": transaction_timestamp(),
            "references": { "merchantReference": merchant_reference(step) },
        });
        if let Some(card) = step.params.get("card") {
            payload["cardPaymentData"] = card.clone();
        }
        if let Some(conversion) = conversion_block(ctx) {
            payload["dynamicCurrencyConversion"] = conversion;
        }
        Ok(ApiRequest::post(merchant_path(step, "refunds")?, payload))
    }

    fn extract_outputs(&self, response: &ApiResponse) -> HashMap<String, Value> {
        let mut outputs = HashMap::new();
        if let Some(refund_id) = response.body.get("refundId") {
            outputs.insert("refund_id".to_string(), refund_id.clone());
        }
        outputs
    }
}

pub struct CaptureRefund;

#[async_trait::async_trait]
impl Operation for CaptureRefund {
    fn kind(&self) -> OperationKind {
        OperationKind::CaptureRefund
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&["refund_id"], &[], false)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&[])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let refund_id = context_id(ctx, "refund_id")?;
        Ok(ApiRequest::post(
            merchant_path(step, &format!("refunds/{}/captures", refund_id))?,
            json!({
                "operationId": operation_id(step),
                "transactionTimestamp": transaction_timestamp(),
            }),
        ))
    }
}

pub struct ReverseRefundAuthorization;

#[async_trait::async_trait]
impl Operation for ReverseRefundAuthorization {
    fn kind(&self) -> OperationKind {
        OperationKind::ReverseRefundAuthorization
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&["refund_id"], &[], false)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&[])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let refund_id = context_id(ctx, "refund_id")?;
        Ok(ApiRequest::post(
            merchant_path(
                step,
                &format!("refunds/{}/authorization-reversals", refund_id),
            )?,
            json!({
                "operationId": operation_id(step),
                "transactionTimestamp": transaction_timestamp(),
            }),
        ))
    }
}

/// Reverses a prior operation by its operation id, regardless of outcome.
pub struct TechnicalReversal;

#[async_trait::async_trait]
impl Operation for TechnicalReversal {
    fn kind(&self) -> OperationKind {
        OperationKind::TechnicalReversal
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&["operation_id"], &[], false)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&[])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let original_operation_id = context_id(ctx, "operation_id")?;
        let mut payload = json!({
            "operationId": operation_id(step),
            "transactionTimestamp": transaction_timestamp(),
        });
        if let Some(reason) = step.param_str("reversal_reason") {
            payload["reason"] = json!(reason);
        }
        Ok(ApiRequest::post(
            merchant_path(
                step,
                &format!("operations/{}/reverse", original_operation_id),
            )?,
            payload,
        ))
    }
}

pub struct AccountVerification;

#[async_trait::async_trait]
impl Operation for AccountVerification {
    fn kind(&self) -> OperationKind {
        OperationKind::AccountVerification
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&[], &["operation_id"], false)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&[])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        _ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let mut payload = json!({
            "operationId": operation_id(step),
            "transactionTimestamp": transaction_timestamp(),
        });
        if let Some(card) = step.params.get("card") {
            payload["cardPaymentData"] = card.clone();
        }
        Ok(ApiRequest::post(
            merchant_path(step, "account-verifications")?,
            payload,
        ))
    }

    fn extract_outputs(&self, response: &ApiResponse) -> HashMap<String, Value> {
        let mut outputs = HashMap::new();
        if let Some(operation_id) = response.body.get("operationId") {
            outputs.insert("operation_id".to_string(), operation_id.clone());
        }
        outputs
    }
}

pub struct Ping;

#[async_trait::async_trait]
impl Operation for Ping {
    fn kind(&self) -> OperationKind {
        OperationKind::Ping
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&[], &[], false)
    }

    fn build_request(
        &self,
        _step: &ChainStep,
        _ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        Ok(ApiRequest::get("/services/v1/ping"))
    }
}

/// The conversion sub-operation: fetches a rate proposal for a classified
/// (PAYMENT/REFUND) transaction. Always built from the step's declared
/// amount, never from a previous conversion result.
pub struct RateInquiry;

#[async_trait::async_trait]
impl Operation for RateInquiry {
    fn kind(&self) -> OperationKind {
        OperationKind::RateInquiry
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::new(&[], &[], false)
    }

    fn params_schema(&self) -> Value {
        merchant_schema(&["amount", "currency"])
    }

    fn build_request(
        &self,
        step: &ChainStep,
        ctx: &RequestContext<'_>,
    ) -> anyhow::Result<ApiRequest> {
        let transaction_type = ctx
            .transaction_type
            .ok_or_else(|| anyhow::anyhow!("rate inquiry requires a transaction classification"))?;
        let amount = step
            .param_i64("amount")
            .ok_or_else(|| anyhow::anyhow!("missing 'amount' parameter"))?;
        let currency = step
            .param_str("currency")
            .ok_or_else(|| anyhow::anyhow!("missing 'currency' parameter"))?;

        let mut payload = json!({
            "operationId": format!("{}:dcc:{}", step.test_id(), random_suffix(25)),
            "targetCurrency": step.param_str("target_currency").unwrap_or("EUR"),
            "transaction": {
                "amount": AmountData::new(amount, currency),
                "transactionType": transaction_type.as_str(),
                "transactionTimestamp": transaction_timestamp(),
            },
        });
        // Later inquiries in a chain reuse the first proposal's rate.
        if let Some(rate_reference_id) = &ctx.conversion.rate_reference_id {
            payload["rateReferenceId"] = json!(rate_reference_id);
        }
        if let Some(card) = step.params.get("card") {
            payload["cardPaymentData"] = json!({
                "brand": card.get("brand").cloned().unwrap_or(Value::Null),
                "bin": card.get("bin").cloned().unwrap_or(Value::Null),
            });
        }
        Ok(ApiRequest::post(merchant_path(step, "dcc-rates")?, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainContext;
    use crate::conversion::ConversionContext;
    use pretty_assertions::assert_eq;

    fn base_params() -> Value {
        json!({
            "test_id": "T-001",
            "acquirer_id": "100812",
            "merchant_id": "520000211",
            "amount": 100,
            "currency": "GBP",
        })
    }

    fn empty_ctx(outputs: &ChainContext) -> RequestContext<'_> {
        RequestContext {
            outputs,
            conversion: ConversionContext::default(),
            transaction_type: None,
        }
    }

    #[test]
    fn test_create_payment_request_uses_declared_amount() {
        let step = ChainStep::new(1, OperationKind::CreatePayment).with_params(base_params());
        let outputs = ChainContext::new();
        let request = CreatePayment
            .build_request(&step, &empty_ctx(&outputs))
            .unwrap();

        assert_eq!(request.path, "/processing/v1/100812/520000211/payments");
        assert_eq!(request.body["amount"]["amount"], json!(100));
        assert_eq!(request.body["amount"]["currencyCode"], json!("GBP"));
        assert!(request.body.get("dynamicCurrencyConversion").is_none());
        let operation_id = request.body["operationId"].as_str().unwrap();
        assert!(operation_id.starts_with("T-001-"));
        assert_eq!(operation_id.len(), 40);
    }

    #[test]
    fn test_create_payment_request_folds_conversion_amount() {
        let step = ChainStep::new(1, OperationKind::CreatePayment).with_params(base_params());
        let outputs = ChainContext::new();
        let ctx = RequestContext {
            outputs: &outputs,
            conversion: ConversionContext {
                rate_reference_id: Some("rr1".into()),
                original_amount: Some(AmountData::new(100, "GBP")),
                resulting_amount: Some(AmountData::new(115, "EUR")),
                exchange_rate: Some(1.15),
            },
            transaction_type: None,
        };
        let request = CreatePayment.build_request(&step, &ctx).unwrap();

        assert_eq!(request.body["amount"]["amount"], json!(115));
        assert_eq!(request.body["amount"]["currencyCode"], json!("EUR"));
        assert_eq!(
            request.body["dynamicCurrencyConversion"]["rateReferenceId"],
            json!("rr1")
        );
    }

    #[test]
    fn test_capture_path_consumes_payment_id_from_context() {
        let step = ChainStep::new(2, OperationKind::CapturePayment).with_params(base_params());
        let mut outputs = ChainContext::new();
        outputs.insert("payment_id", json!("pay-42"));
        let request = CapturePayment
            .build_request(&step, &empty_ctx(&outputs))
            .unwrap();

        assert_eq!(
            request.path,
            "/processing/v1/100812/520000211/payments/pay-42/captures"
        );
    }

    #[test]
    fn test_capture_without_payment_id_fails_to_build() {
        let step = ChainStep::new(2, OperationKind::CapturePayment).with_params(base_params());
        let outputs = ChainContext::new();
        let err = CapturePayment
            .build_request(&step, &empty_ctx(&outputs))
            .unwrap_err();
        assert!(err.to_string().contains("payment_id"));
    }

    #[test]
    fn test_rate_inquiry_reuses_existing_rate_reference() {
        let step = ChainStep::new(3, OperationKind::RefundPayment)
            .with_params(json!({
                "test_id": "T-002",
                "acquirer_id": "100812",
                "merchant_id": "520000211",
                "amount": 250,
                "currency": "GBP",
                "target_currency": "SEK",
            }));
        let outputs = ChainContext::new();
        let ctx = RequestContext {
            outputs: &outputs,
            conversion: ConversionContext {
                rate_reference_id: Some("rr9".into()),
                ..Default::default()
            },
            transaction_type: Some(crate::conversion::TransactionType::Refund),
        };
        let request = RateInquiry.build_request(&step, &ctx).unwrap();

        assert_eq!(request.path, "/processing/v1/100812/520000211/dcc-rates");
        assert_eq!(request.body["rateReferenceId"], json!("rr9"));
        assert_eq!(request.body["targetCurrency"], json!("SEK"));
        assert_eq!(request.body["transaction"]["transactionType"], json!("REFUND"));
        // The inquiry always quotes the declared amount, not a previous result.
        assert_eq!(request.body["transaction"]["amount"]["amount"], json!(250));
    }

    #[test]
    fn test_rate_inquiry_requires_classification() {
        let step = ChainStep::new(1, OperationKind::CreatePayment).with_params(base_params());
        let outputs = ChainContext::new();
        let err = RateInquiry
            .build_request(&step, &empty_ctx(&outputs))
            .unwrap_err();
        assert!(err.to_string().contains("classification"));
    }

    #[test]
    fn test_params_schema_rejects_missing_amount() {
        let step_params = json!({"acquirer_id": "a", "merchant_id": "m"});
        let err = CreatePayment.validate_params(&step_params).unwrap_err();
        assert!(err.to_string().contains("create_payment"));

        let ok_params = base_params();
        CreatePayment.validate_params(&ok_params).unwrap();
    }

    #[test]
    fn test_refund_extracts_nested_refund_id() {
        let response = ApiResponse::ok(json!({
            "refund": {"refundId": "ref-7", "status": "AUTHORIZED"}
        }));
        let outputs = RefundPayment.extract_outputs(&response);
        assert_eq!(outputs.get("refund_id"), Some(&json!("ref-7")));
    }
}
