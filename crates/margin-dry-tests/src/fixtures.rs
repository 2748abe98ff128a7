// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Small builders for records, hello payloads and attribute pools.

use std::collections::BTreeMap;

use margin_access::PadAccess;
use margin_app_core::Record;
use margin_changeset::{Attribute, JsonablePool, COMMENT_ATTRIBUTE};
use margin_session_proto::HelloPayload;
use serde_json::Value;

/// Record from a JSON object literal; anything else yields an empty record.
///
/// ```
/// let r = margin_dry_tests::record(serde_json::json!({"text": "hi"}));
/// assert_eq!(r["text"], "hi");
/// ```
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Hello for `user` (author id `a.<user>`) holding `access` on `pad`.
pub fn hello(user: &str, pad: &str, access: PadAccess) -> HelloPayload {
    HelloPayload {
        author_id: format!("a.{user}"),
        user: Some(user.to_owned()),
        authorizations: BTreeMap::from([(pad.to_owned(), access)]),
        client_version: 1,
    }
}

/// Jsonable pool holding one `comment` marker and the code it was given.
pub fn comment_pool(comment_id: &str) -> (JsonablePool, u32) {
    let pool = JsonablePool {
        num_to_attrib: BTreeMap::from([(
            "0".to_owned(),
            Attribute::new(COMMENT_ATTRIBUTE, comment_id),
        )]),
        next_num: 1,
    };
    (pool, 0)
}
