use super::ids::*;
use super::*;

#[test]
fn organization_id_validation() {
    assert_eq!(
        OrganizationId::try_new("").unwrap_err(),
        OrganizationIdError::Empty
    );
    assert_eq!(
        OrganizationId::try_new("-org").unwrap_err(),
        OrganizationIdError::InvalidFirstChar
    );
    assert_eq!(
        OrganizationId::try_new("org a").unwrap_err(),
        OrganizationIdError::InvalidChar { ch: ' ', index: 3 }
    );
    assert!(OrganizationId::try_new("org-1/team_a").is_ok());
}

#[test]
fn entity_id_validation() {
    assert_eq!(BlockId::try_new("").unwrap_err(), EntityIdError::Empty);
    assert_eq!(
        BlockId::try_new("block 1").unwrap_err(),
        EntityIdError::ContainsWhitespace
    );
    assert_eq!(
        AgentId::try_new("agent\u{0007}").unwrap_err(),
        EntityIdError::ContainsControl
    );
    assert_eq!(
        UserId::try_new("u".repeat(257)).unwrap_err(),
        EntityIdError::TooLong
    );
    assert_eq!(
        BlockId::try_new("block-abc").unwrap().as_str(),
        "block-abc"
    );
}

#[test]
fn entity_ids_reject_invalid_values_when_deserialized() {
    let ok: BlockId = serde_json::from_str("\"block-1\"").expect("valid id");
    assert_eq!(ok.as_str(), "block-1");
    assert!(serde_json::from_str::<BlockId>("\"\"").is_err());
}

#[test]
fn actor_kind_follows_variant() {
    let user = Actor::User(UserId::try_new("user-1").unwrap());
    let agent = Actor::Agent(AgentId::try_new("agent-1").unwrap());
    assert_eq!(user.kind(), ActorKind::User);
    assert_eq!(agent.kind(), ActorKind::Agent);
    assert_eq!(agent.id(), "agent-1");
    assert_eq!(
        ActorKind::parse(ActorKind::Agent.as_str()),
        Some(ActorKind::Agent)
    );
    assert_eq!(ActorKind::parse("robot"), None);
}

#[test]
fn clamp_value_keeps_short_values() {
    let clamped = clamp_value("abc".to_string(), 3);
    assert_eq!(clamped.value, "abc");
    assert_eq!(clamped.truncated_from, None);
}

#[test]
fn clamp_value_cuts_to_limit() {
    let clamped = clamp_value("abcdefghijkl".to_string(), 10);
    assert_eq!(clamped.value, "abcdefghij");
    assert_eq!(clamped.truncated_from, Some(12));
}

#[test]
fn clamp_value_counts_characters_not_bytes() {
    let clamped = clamp_value("héllo wörld".to_string(), 5);
    assert_eq!(clamped.value, "héllo");
    assert_eq!(clamped.value.chars().count(), 5);
    assert_eq!(clamped.truncated_from, Some(11));

    let clamped = clamp_value("ééé".to_string(), 0);
    assert_eq!(clamped.value, "");
    assert_eq!(clamped.truncated_from, Some(3));
}

#[test]
fn block_fields_round_trip_through_apply() {
    let mut block = Block {
        id: BlockId::try_new("block-1").unwrap(),
        organization_id: OrganizationId::try_new("org").unwrap(),
        label: "persona".to_string(),
        description: None,
        value: "v1".to_string(),
        limit: 10,
        metadata: serde_json::json!({}),
        is_template: false,
        template_name: None,
        project_id: None,
        current_history_id: None,
        version: 1,
        last_updated_by: None,
        created_at_ms: 0,
        updated_at_ms: 0,
    };
    let saved = block.fields();
    block.value = "v2".to_string();
    block.limit = 20;
    assert_ne!(block.fields(), saved);
    block.apply_fields(saved.clone());
    assert_eq!(block.fields(), saved);
}
