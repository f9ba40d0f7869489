//! Log payload decoding.

use thiserror::Error;

use crate::models::Order;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed order payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Order payload has no order_uid")]
    MissingOrderId,
}

/// Decode a JSON payload into an order.
///
/// Missing fields take their zero values; a blank `order_uid` is an error
/// because nothing can be stored or looked up without it.
pub fn decode_order(payload: &[u8]) -> Result<Order, DecodeError> {
    let order: Order = serde_json::from_slice(payload)?;
    if order.order_uid.trim().is_empty() {
        return Err(DecodeError::MissingOrderId);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::factories;

    #[test]
    fn test_decodes_wire_payload() {
        let order = factories::valid_order("b563feb7b2b84b6test");
        let payload = serde_json::to_vec(&order).unwrap();

        let decoded = decode_order(&payload).unwrap();
        assert_eq!(decoded, order);
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(matches!(
            decode_order(b"not json at all"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_order(b"[{\"order_uid\":\"abc\"}]"),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_missing_or_blank_id() {
        assert!(matches!(
            decode_order(b"{\"track_number\":\"WBILMTESTTRACK\"}"),
            Err(DecodeError::MissingOrderId)
        ));
        assert!(matches!(
            decode_order(b"{\"order_uid\":\"   \"}"),
            Err(DecodeError::MissingOrderId)
        ));
    }

    #[test]
    fn test_sparse_payload_decodes_with_zero_values() {
        let order = decode_order(b"{\"order_uid\":\"sparse-order\"}").unwrap();
        assert_eq!(order.order_uid, "sparse-order");
        assert!(order.items.is_empty());
        assert_eq!(order.payment.amount, 0);
    }
}
