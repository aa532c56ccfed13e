//! Data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use serde_helpers::*;

/// Vehicle positions feed message
///
/// JSON rendition of a GTFS-realtime `FeedMessage`, as served by the OC
/// Transpo NexTrip API with `format=json`. Field names are PascalCase.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct FeedMessage {
    /// Feed entities, empty if the field is missing
    #[serde(default, deserialize_with = "deserialize_nullable_list")]
    pub entity: Vec<FeedEntity>,
}

/// One element of the feed
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct FeedEntity {
    #[serde(default, deserialize_with = "deserialize_string_like")]
    pub id: Option<String>,
    /// Real-time position of a vehicle, None for other entity kinds and
    /// for a `null` or `{}` vehicle object
    #[serde(default, deserialize_with = "deserialize_non_empty_object")]
    pub vehicle: Option<VehiclePosition>,
}

/// Real-time position of a single vehicle
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct VehiclePosition {
    #[serde(default)]
    pub vehicle: Option<VehicleDescriptor>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub trip: Option<TripDescriptor>,
    /// Vehicle stop status
    ///
    /// - 0 = incoming at
    /// - 1 = stopped at
    /// - 2 = in transit to
    #[serde(default, deserialize_with = "deserialize_stop_status")]
    pub current_status: Option<i64>,
}

/// Identification of the physical vehicle
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleDescriptor {
    #[serde(default, deserialize_with = "deserialize_string_like")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_like")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_like")]
    pub license_plate: Option<String>,
    /// Accessibility flag; any truthy value counts as accessible
    #[serde(default, deserialize_with = "deserialize_truthy")]
    pub wheelchair_accessible: bool,
}

/// Geographic position, WGS84 decimal degrees
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Position {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Degrees clockwise from true north
    #[serde(default)]
    pub bearing: Option<f64>,
    /// Meters per second
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Trip the vehicle is serving
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TripDescriptor {
    #[serde(default, deserialize_with = "deserialize_string_like")]
    pub trip_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_like")]
    pub route_id: Option<String>,
}

impl TripDescriptor {
    pub fn is_empty(&self) -> bool {
        self.trip_id.is_none() && self.route_id.is_none()
    }
}

/// Flat record of one tracked vehicle, as served to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub vehicle_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bearing: Option<f64>,
    pub speed: Option<f64>,
    /// Capture time of the snapshot this record belongs to
    pub timestamp: DateTime<Utc>,
    pub route_id: Option<String>,
    pub trip_id: Option<String>,
    pub current_status: Option<i64>,
    pub wheelchair_accessible: bool,
    pub license_plate: Option<String>,
}

impl VehicleRecord {
    /// Flatten a vehicle position, filling missing fields with None
    pub fn from_position(vehicle: &VehiclePosition, timestamp: DateTime<Utc>) -> Self {
        let descriptor = vehicle.vehicle.as_ref();
        let position = vehicle.position.as_ref();
        let trip = vehicle.trip.as_ref().filter(|t| !t.is_empty());

        Self {
            vehicle_id: descriptor.and_then(|d| d.id.clone()),
            latitude: position.and_then(|p| p.latitude),
            longitude: position.and_then(|p| p.longitude),
            bearing: position.and_then(|p| p.bearing),
            speed: position.and_then(|p| p.speed),
            timestamp,
            route_id: trip.and_then(|t| t.route_id.clone()),
            trip_id: trip.and_then(|t| t.trip_id.clone()),
            current_status: vehicle.current_status,
            wheelchair_accessible: descriptor.is_some_and(|d| d.wheelchair_accessible),
            license_plate: descriptor.and_then(|d| d.license_plate.clone()),
        }
    }
}

impl FeedMessage {
    /// Convert all vehicle entities into records stamped with `timestamp`
    ///
    /// Entities without a vehicle position are skipped.
    pub fn into_records(self, timestamp: DateTime<Utc>) -> Vec<VehicleRecord> {
        self.entity
            .into_iter()
            .filter_map(|entity| entity.vehicle)
            .map(|vehicle| VehicleRecord::from_position(&vehicle, timestamp))
            .collect()
    }
}

/// Custom deserializers
mod serde_helpers {
    use serde::{self, de::DeserializeOwned, Deserialize, Deserializer};
    use serde_json::Value;

    /// Nested object that counts as absent when `null` or without any keys,
    /// whether or not the keys are modelled
    pub fn deserialize_non_empty_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        match Option::<serde_json::Map<String, Value>>::deserialize(deserializer)? {
            Some(object) if !object.is_empty() => T::deserialize(Value::Object(object))
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }

    pub fn deserialize_nullable_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }

    /// Identifier that may arrive as a string or a bare number
    pub fn deserialize_string_like<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Truthiness of an arbitrary JSON value; null, false, 0, "" and empty
    /// containers are false
    pub fn deserialize_truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => false,
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        })
    }

    /// Stop status as numeric code, accepting the GTFS-realtime enum names
    pub fn deserialize_stop_status<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => match s.as_str() {
                "INCOMING_AT" => Some(0),
                "STOPPED_AT" => Some(1),
                "IN_TRANSIT_TO" => Some(2),
                other => other.parse().ok(),
            },
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn captured_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 5, 14, 30, 0).unwrap()
    }

    #[test]
    fn parse_full_entity() {
        let s = r#"{
          "Header": { "GtfsRealtimeVersion": "2.0", "Timestamp": 1730817000 },
          "Entity": [
            {
              "Id": "6611",
              "Vehicle": {
                "Trip": { "TripId": "2021-4100", "RouteId": "95", "DirectionId": 0 },
                "Position": { "Latitude": 45.4215, "Longitude": -75.6972, "Bearing": 182.0, "Speed": 11.5 },
                "CurrentStatus": 2,
                "Timestamp": 1730816990,
                "Vehicle": { "Id": "6611", "Label": "6611", "LicensePlate": "B6611", "WheelchairAccessible": 1 }
              }
            }
          ]
        }"#;
        let feed: FeedMessage = serde_json::from_str(s).unwrap();
        let records = feed.into_records(captured_at());

        let expected = VehicleRecord {
            vehicle_id: Some("6611".to_string()),
            latitude: Some(45.4215),
            longitude: Some(-75.6972),
            bearing: Some(182.0),
            speed: Some(11.5),
            timestamp: captured_at(),
            route_id: Some("95".to_string()),
            trip_id: Some("2021-4100".to_string()),
            current_status: Some(2),
            wheelchair_accessible: true,
            license_plate: Some("B6611".to_string()),
        };

        assert_eq!(records, vec![expected]);
    }

    #[test]
    fn entity_without_vehicle_is_skipped() {
        let s = r#"{
          "Entity": [
            {
              "Id": "1",
              "Vehicle": {
                "Vehicle": { "Id": "4402" },
                "Position": { "Latitude": 45.1, "Longitude": -75.1 },
                "Trip": { "TripId": "t1", "RouteId": "6" }
              }
            },
            {
              "Id": "2",
              "Position": { "Latitude": 45.2, "Longitude": -75.2 }
            }
          ]
        }"#;
        let feed: FeedMessage = serde_json::from_str(s).unwrap();
        let records = feed.into_records(captured_at());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vehicle_id.as_deref(), Some("4402"));
        assert_eq!(records[0].route_id.as_deref(), Some("6"));
    }

    #[test]
    fn empty_and_null_vehicle_objects_are_skipped() {
        let s = r#"{ "Entity": [ { "Vehicle": {} }, { "Vehicle": null }, { "Vehicle": { "CurrentStatus": 1 } } ] }"#;
        let feed: FeedMessage = serde_json::from_str(s).unwrap();
        let records = feed.into_records(captured_at());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].current_status, Some(1));
    }

    #[test]
    fn vehicle_with_only_unmodelled_or_null_fields_is_kept() {
        let s = r#"{
          "Entity": [
            { "Vehicle": { "Timestamp": 1730816990, "StopId": "3000" } },
            { "Vehicle": { "Vehicle": null, "Position": null } }
          ]
        }"#;
        let feed: FeedMessage = serde_json::from_str(s).unwrap();
        let records = feed.into_records(captured_at());

        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.vehicle_id, None);
            assert_eq!(record.latitude, None);
            assert_eq!(record.route_id, None);
            assert!(!record.wheelchair_accessible);
        }
    }

    #[test]
    fn non_object_vehicle_fails_payload() {
        let s = r#"{ "Entity": [ { "Vehicle": 5 } ] }"#;
        assert!(serde_json::from_str::<FeedMessage>(s).is_err());
    }

    #[test]
    fn missing_nested_fields_are_none() {
        let s = r#"{ "Entity": [ { "Vehicle": { "Position": { "Latitude": 45.3 } } } ] }"#;
        let feed: FeedMessage = serde_json::from_str(s).unwrap();
        let records = feed.into_records(captured_at());

        let expected = VehicleRecord {
            vehicle_id: None,
            latitude: Some(45.3),
            longitude: None,
            bearing: None,
            speed: None,
            timestamp: captured_at(),
            route_id: None,
            trip_id: None,
            current_status: None,
            wheelchair_accessible: false,
            license_plate: None,
        };

        assert_eq!(records, vec![expected]);
    }

    #[test]
    fn empty_trip_yields_no_trip_fields() {
        let s = r#"{ "Entity": [ { "Vehicle": { "Vehicle": { "Id": "1" }, "Trip": {} } } ] }"#;
        let feed: FeedMessage = serde_json::from_str(s).unwrap();
        let record = &feed.into_records(captured_at())[0];

        assert_eq!(record.trip_id, None);
        assert_eq!(record.route_id, None);
    }

    #[test]
    fn numeric_identifiers_become_strings() {
        let s = r#"{ "Vehicle": { "Id": 6611, "LicensePlate": null }, "Trip": { "RouteId": 95, "TripId": "x" } }"#;
        let vehicle: VehiclePosition = serde_json::from_str(s).unwrap();
        let record = VehicleRecord::from_position(&vehicle, captured_at());

        assert_eq!(record.vehicle_id.as_deref(), Some("6611"));
        assert_eq!(record.route_id.as_deref(), Some("95"));
        assert_eq!(record.license_plate, None);
    }

    #[test]
    fn wheelchair_flag_truthiness() {
        let cases = [
            (r#"{ "Id": "1" }"#, false),
            (r#"{ "WheelchairAccessible": null }"#, false),
            (r#"{ "WheelchairAccessible": 0 }"#, false),
            (r#"{ "WheelchairAccessible": false }"#, false),
            (r#"{ "WheelchairAccessible": "" }"#, false),
            (r#"{ "WheelchairAccessible": 2 }"#, true),
            (r#"{ "WheelchairAccessible": true }"#, true),
            (r#"{ "WheelchairAccessible": "WHEELCHAIR_ACCESSIBLE" }"#, true),
        ];

        for (descriptor, expected) in cases {
            let descriptor: VehicleDescriptor = serde_json::from_str(descriptor).unwrap();
            assert_eq!(descriptor.wheelchair_accessible, expected, "{:?}", descriptor);
        }
    }

    #[test]
    fn stop_status_names_and_codes() {
        let parse = |s: &str| {
            serde_json::from_str::<VehiclePosition>(s)
                .unwrap()
                .current_status
        };

        assert_eq!(parse(r#"{ "CurrentStatus": 1 }"#), Some(1));
        assert_eq!(parse(r#"{ "CurrentStatus": "IN_TRANSIT_TO" }"#), Some(2));
        assert_eq!(parse(r#"{ "CurrentStatus": "INCOMING_AT" }"#), Some(0));
        assert_eq!(parse(r#"{ "CurrentStatus": "UNKNOWN" }"#), None);
        assert_eq!(parse(r#"{ "CurrentStatus": null }"#), None);
    }

    #[test]
    fn missing_or_null_entity_list_is_empty() {
        for s in [r#"{}"#, r#"{ "Entity": null }"#, r#"{ "Entity": [] }"#] {
            let feed: FeedMessage = serde_json::from_str(s).unwrap();
            assert!(feed.into_records(captured_at()).is_empty());
        }
    }

    #[test]
    fn record_serializes_flat_with_iso_timestamp() {
        let record = VehicleRecord {
            vehicle_id: Some("6611".to_string()),
            latitude: Some(45.4215),
            longitude: Some(-75.6972),
            bearing: None,
            speed: None,
            timestamp: captured_at(),
            route_id: None,
            trip_id: None,
            current_status: Some(1),
            wheelchair_accessible: false,
            license_plate: None,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "vehicle_id": "6611",
                "latitude": 45.4215,
                "longitude": -75.6972,
                "bearing": null,
                "speed": null,
                "timestamp": "2024-11-05T14:30:00Z",
                "route_id": null,
                "trip_id": null,
                "current_status": 1,
                "wheelchair_accessible": false,
                "license_plate": null
            })
        );
    }
}
