use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;

use crate::workflows::domain::ActorId;
use crate::workflows::store::Tables;

pub const SESSION_TOKEN_LENGTH: usize = 48;

/// Server-side half of a bearer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub actor_id: ActorId,
    pub expires_at: DateTime<Utc>,
}

/// Bearer session handed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub actor_id: ActorId,
    pub expires_at: DateTime<Utc>,
}

pub(crate) fn open(
    tables: &mut Tables,
    actor_id: ActorId,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Session {
    tables.sessions.retain(|_, record| record.expires_at > now);

    let mut token = generate_token();
    while tables.sessions.contains_key(&token) {
        token = generate_token();
    }

    let expires_at = now + ttl;
    tables.sessions.insert(
        token.clone(),
        SessionRecord {
            actor_id,
            expires_at,
        },
    );
    Session {
        token,
        actor_id,
        expires_at,
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
