use std::collections::HashMap;

use crate::dictionary::{dict::format_properties_value, parse_number};

use super::{dict::Properties, AccessType, DataType, Value};

/// A single addressable entry in the Object Dictionary.
///
/// Beyond the plain EDS-derived fields (`storage_location`, `access_type`,
/// `pdo_mappable`, min/max/default), this carries the attributes the typed
/// access layer needs: a read-time scaling `factor`, named `bit_definitions`
/// for bitfield helpers, and a bijective `value_descriptions` map for enum helpers.
#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub storage_location: String,
    pub data_type: DataType,
    pub value: Value,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub pdo_mappable: bool,
    pub access_type: AccessType,
    pub parameter_value: Option<Value>,
    pub index: u16,
    pub sub_index: u8,
    /// Scaling factor applied on read, divided out on write. `1.0` when absent.
    pub factor: f64,
    /// Named bit fields: field name -> ordered list of bit positions (LSB first).
    pub bit_definitions: HashMap<String, Vec<u32>>,
    /// Bijective integer <-> display string mapping for enum-valued entries.
    pub value_descriptions: HashMap<i64, String>,
}

impl Variable {
    pub fn new(
        properties: &Properties,
        node_id: u8,
        name: &str,
        index: u16,
        sub_index: Option<u8>,
    ) -> Self {
        let storage_location = properties
            .get("StorageLocation")
            .cloned()
            .unwrap_or_default();

        let access_type = properties
            .get("AcessType")
            .map(|line| AccessType::from_str(line))
            .unwrap_or(AccessType::READ_WRITE);

        let pdo_mapping = properties
            .get("PDOMapping")
            .unwrap_or(&String::from("0"))
            .parse::<i32>()
            .unwrap_or(0)
            != 0;

        let dt = properties
            .get("DataType")
            .map(|line| parse_number(line))
            .map(DataType::from_u32)
            .expect("DataType is not present in dict");

        let min = format_properties_value(properties, "LowLimit", node_id, dt);

        let max = format_properties_value(properties, "HighLimit", node_id, dt);

        let default_value =
            format_properties_value(properties, "DefaultValue", node_id, dt)
                .unwrap_or_else(|| Value::from_bytes(&dt.as_default_bytes()));

        let parameter_value =
            format_properties_value(properties, "ParameterValue", node_id, dt);

        let factor = properties
            .get("Factor")
            .map(|raw| raw.parse::<f64>().unwrap_or(1.0))
            .unwrap_or(1.0);

        let bit_definitions = properties
            .get("BitDefinitions")
            .map(|raw| parse_bit_definitions(raw))
            .unwrap_or_default();

        let value_descriptions = properties
            .get("ValueDescriptions")
            .map(|raw| parse_value_descriptions(raw))
            .unwrap_or_default();

        Variable {
            name: name.to_owned(),
            storage_location,
            data_type: dt,
            access_type,
            pdo_mappable: pdo_mapping,
            min,
            max,
            value: default_value,
            parameter_value,
            index,
            sub_index: sub_index.unwrap_or(0),
            factor,
            bit_definitions,
            value_descriptions,
        }
    }
}

/// Parse a `name:pos,pos,...;name:pos,...` bit field description.
fn parse_bit_definitions(raw: &str) -> HashMap<String, Vec<u32>> {
    let mut out = HashMap::new();
    for field in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((name, positions)) = field.split_once(':') else { continue };
        let positions: Vec<u32> = positions
            .split(',')
            .filter_map(|p| p.trim().parse::<u32>().ok())
            .collect();
        if !positions.is_empty() {
            out.insert(name.trim().to_string(), positions);
        }
    }
    out
}

/// Parse a `value=display;value=display` enum description.
fn parse_value_descriptions(raw: &str) -> HashMap<i64, String> {
    let mut out = HashMap::new();
    for entry in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((value, display)) = entry.split_once('=') else { continue };
        if let Ok(value) = value.trim().parse::<i64>() {
            out.insert(value, display.trim().to_string());
        }
    }
    out
}
