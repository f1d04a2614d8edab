use crate::model::Id;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct ContentMarker;

/// Every collection held in the store.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Collection {
    Users,
    Market,
    Announcements,
    Genealogy,
    Gallery,
    Documents,
    Deceased,
    Tickets,
}

/// The collections served by the generic content endpoints.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ContentKind {
    Genealogy,
    Gallery,
    Documents,
    Deceased,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Unknown collection: {0:?}")]
pub struct UnknownCollectionError(pub String);

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Users,
        Collection::Market,
        Collection::Announcements,
        Collection::Genealogy,
        Collection::Gallery,
        Collection::Documents,
        Collection::Deceased,
        Collection::Tickets,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Market => "market",
            Collection::Announcements => "announcements",
            Collection::Genealogy => "genealogy",
            Collection::Gallery => "gallery",
            Collection::Documents => "documents",
            Collection::Deceased => "deceased",
            Collection::Tickets => "tickets",
        }
    }

    /// The whitelist of collections exposed through the generic endpoints.
    #[must_use]
    pub fn content_kind(self) -> Option<ContentKind> {
        match self {
            Collection::Genealogy => Some(ContentKind::Genealogy),
            Collection::Gallery => Some(ContentKind::Gallery),
            Collection::Documents => Some(ContentKind::Documents),
            Collection::Deceased => Some(ContentKind::Deceased),
            Collection::Users
            | Collection::Market
            | Collection::Announcements
            | Collection::Tickets => None,
        }
    }
}

impl FromStr for Collection {
    type Err = UnknownCollectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|collection| collection.as_str() == s)
            .ok_or_else(|| UnknownCollectionError(s.to_owned()))
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ContentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        Collection::from(self).as_str()
    }
}

impl From<ContentKind> for Collection {
    fn from(value: ContentKind) -> Self {
        match value {
            ContentKind::Genealogy => Collection::Genealogy,
            ContentKind::Gallery => Collection::Gallery,
            ContentKind::Documents => Collection::Documents,
            ContentKind::Deceased => Collection::Deceased,
        }
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A genealogy, gallery, document or memorial entry.
///
/// Apart from the id the fields are free-form and kept exactly as submitted.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Id<ContentMarker>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ContentItem {
    #[must_use]
    pub fn new(id: Id<ContentMarker>, mut fields: Map<String, Value>) -> Self {
        fields.remove("id");
        Self { id, fields }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::content::{Collection, ContentItem, ContentKind};
    use serde_json::json;

    #[test]
    fn only_content_kinds_are_whitelisted() {
        let whitelisted: Vec<_> = Collection::ALL
            .into_iter()
            .filter_map(Collection::content_kind)
            .collect();

        assert_eq!(
            whitelisted,
            [
                ContentKind::Genealogy,
                ContentKind::Gallery,
                ContentKind::Documents,
                ContentKind::Deceased
            ]
        );
    }

    #[test]
    fn collection_names() {
        for collection in Collection::ALL {
            assert_eq!(collection.as_str().parse::<Collection>(), Ok(collection));
        }
        assert!("supportTickets".parse::<Collection>().is_err());
        assert!("Genealogy".parse::<Collection>().is_err());
    }

    #[test]
    fn client_ids_are_replaced() {
        let fields = json!({"id": 1, "title": "Hacıalar Sülalesi"});
        let serde_json::Value::Object(fields) = fields else {
            unreachable!()
        };

        let item = ContentItem::new(99.into(), fields);

        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"id": 99, "title": "Hacıalar Sülalesi"})
        );
    }

    #[test]
    fn legacy_string_ids_load() {
        let item: ContentItem =
            serde_json::from_value(json!({"id": "1", "src": "images/a.jpg"})).unwrap();

        assert_eq!(item.id, 1.into());
        assert_eq!(item.fields.get("src"), Some(&json!("images/a.jpg")));
        assert!(!item.fields.contains_key("id"));
    }
}
