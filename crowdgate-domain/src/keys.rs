//! Lock store key grammar. Other services scan and parse these keys, so the
//! exact format is a cross-service contract.

/// `lock:event:{eventId}:seat:{seatId}`
pub fn seat_lock(event_id: i64, seat_id: &str) -> String {
    format!("lock:event:{}:seat:{}", event_id, seat_id)
}

/// Prefix matching every seat lock of one event.
pub fn seat_lock_prefix(event_id: i64) -> String {
    format!("lock:event:{}:seat:", event_id)
}

/// Extract the seat id back out of a full lock key.
pub fn seat_from_lock_key<'a>(event_id: i64, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(seat_lock_prefix(event_id).as_str())
}

/// `inventory:event:{eventId}`
pub fn tatkal_inventory(event_id: i64) -> String {
    format!("inventory:event:{}", event_id)
}

/// Fixed-window rate limit counter per client address.
pub fn rate_limit(client: &str) -> String {
    format!("ratelimit:{}", client)
}
