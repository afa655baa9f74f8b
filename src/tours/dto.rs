use serde::Deserialize;

use crate::query::{FieldDef, FieldKind};

/// Externally visible tour fields. `updatedAt` is store-maintained metadata
/// and drops out of the default projection.
pub static TOUR_FIELDS: [FieldDef; 11] = [
    FieldDef { name: "name", column: "name", kind: FieldKind::Text, internal: false },
    FieldDef { name: "duration", column: "duration", kind: FieldKind::Number, internal: false },
    FieldDef { name: "maxGroupSize", column: "max_group_size", kind: FieldKind::Number, internal: false },
    FieldDef { name: "difficulty", column: "difficulty", kind: FieldKind::Text, internal: false },
    FieldDef { name: "price", column: "price", kind: FieldKind::Number, internal: false },
    FieldDef { name: "ratingAverage", column: "rating_average", kind: FieldKind::Number, internal: false },
    FieldDef { name: "ratingsQuantity", column: "ratings_quantity", kind: FieldKind::Number, internal: false },
    FieldDef { name: "summary", column: "summary", kind: FieldKind::Text, internal: false },
    FieldDef { name: "description", column: "description", kind: FieldKind::Text, internal: false },
    FieldDef { name: "createdAt", column: "created_at", kind: FieldKind::Timestamp, internal: false },
    FieldDef { name: "updatedAt", column: "updated_at", kind: FieldKind::Timestamp, internal: true },
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTour {
    pub name: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub price: f64,
    pub summary: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourPatch {
    pub name: Option<String>,
    pub duration: Option<i32>,
    pub max_group_size: Option<i32>,
    pub difficulty: Option<String>,
    pub price: Option<f64>,
    pub rating_average: Option<f64>,
    pub ratings_quantity: Option<i32>,
    pub summary: Option<String>,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tour_uses_camel_case_field_names() {
        let tour: NewTour = serde_json::from_value(serde_json::json!({
            "name": "The Forest Hiker",
            "duration": 5,
            "maxGroupSize": 25,
            "difficulty": "easy",
            "price": 397.0,
            "summary": "Breathtaking hike through the Canadian Banff National Park"
        }))
        .unwrap();
        assert_eq!(tour.max_group_size, 25);
        assert!(tour.description.is_none());
    }
}
