// Row ids for refresh tokens and push endpoints.
//
// These are UUIDv7, generated app-side so that ids sort by creation time in
// both the Postgres and the in-memory store. Users keep PG's
// gen_random_uuid() (v4).

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Generate a random UUIDv4, used where ordering must not leak timing.
pub fn uuidv4() -> Uuid {
    Uuid::new_v4()
}
