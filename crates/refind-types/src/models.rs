use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed category set for item reports. Stored and serialized as the
/// human-readable label so the database stays greppable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Electronics,
    Clothing,
    Accessories,
    Books,
    #[serde(rename = "IDs/Documents")]
    IdsDocuments,
    Bags,
    #[serde(rename = "Sports Equipment")]
    SportsEquipment,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Electronics,
        Category::Clothing,
        Category::Accessories,
        Category::Books,
        Category::IdsDocuments,
        Category::Bags,
        Category::SportsEquipment,
        Category::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Electronics => "Electronics",
            Category::Clothing => "Clothing",
            Category::Accessories => "Accessories",
            Category::Books => "Books",
            Category::IdsDocuments => "IDs/Documents",
            Category::Bags => "Bags",
            Category::SportsEquipment => "Sports Equipment",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.label() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

/// Whether the report describes something lost or something found.
/// Immutable for the lifetime of the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Lost,
    Found,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Lost => "lost",
            ItemType::Found => "found",
        }
    }
}

impl FromStr for ItemType {
    type Err = UnknownItemType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lost" => Ok(ItemType::Lost),
            "found" => Ok(ItemType::Found),
            other => Err(UnknownItemType(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown item type: {0}")]
pub struct UnknownItemType(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Resolved,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = UnknownItemStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ItemStatus::Active),
            "resolved" => Ok(ItemStatus::Resolved),
            other => Err(UnknownItemStatus(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown item status: {0}")]
pub struct UnknownItemStatus(pub String);

/// Read-mostly projection of a registered user, attached to items and
/// conversations wherever a display name is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

/// A conversation is attached to exactly one of its two participants from
/// the viewer's perspective; this error marks the cases where the viewer
/// is not exactly one of them.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParticipantError {
    #[error("user {0} is not a participant of this conversation")]
    NotAParticipant(Uuid),
    #[error("conversation has the same user in both participant slots")]
    DegeneratePair,
}

/// Resolve the "other" side of a conversation: given both participants and
/// the current user, return the one that is not the current user.
///
/// Exactly one participant must match the current user. Both matching (a
/// self-conversation, which creation refuses) or neither matching is a
/// data-integrity error, not a silent default.
pub fn other_participant<'a>(
    user1: &'a Profile,
    user2: &'a Profile,
    current_user_id: Uuid,
) -> Result<&'a Profile, ParticipantError> {
    if user1.id == user2.id {
        return Err(ParticipantError::DegeneratePair);
    }
    if user1.id == current_user_id {
        Ok(user2)
    } else if user2.id == current_user_id {
        Ok(user1)
    } else {
        Err(ParticipantError::NotAParticipant(current_user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            avatar_url: None,
        }
    }

    #[test]
    fn category_labels_round_trip() {
        for cat in Category::ALL {
            assert_eq!(cat.label().parse::<Category>().unwrap(), cat);
        }
        assert!("Furniture".parse::<Category>().is_err());
    }

    #[test]
    fn category_serde_uses_labels() {
        let json = serde_json::to_string(&Category::IdsDocuments).unwrap();
        assert_eq!(json, "\"IDs/Documents\"");
        let back: Category = serde_json::from_str("\"Sports Equipment\"").unwrap();
        assert_eq!(back, Category::SportsEquipment);
    }

    #[test]
    fn resolves_other_participant_from_either_slot() {
        let alice = profile("Alice");
        let bob = profile("Bob");

        let other = other_participant(&alice, &bob, alice.id).unwrap();
        assert_eq!(other.id, bob.id);

        let other = other_participant(&alice, &bob, bob.id).unwrap();
        assert_eq!(other.id, alice.id);
    }

    #[test]
    fn outsider_is_an_integrity_error() {
        let alice = profile("Alice");
        let bob = profile("Bob");
        let carol = profile("Carol");

        assert_eq!(
            other_participant(&alice, &bob, carol.id),
            Err(ParticipantError::NotAParticipant(carol.id))
        );
    }

    #[test]
    fn degenerate_pair_is_an_integrity_error() {
        let alice = profile("Alice");
        let clone = alice.clone();

        assert_eq!(
            other_participant(&alice, &clone, alice.id),
            Err(ParticipantError::DegeneratePair)
        );
    }
}
