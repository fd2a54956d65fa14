//! Fixtures shared by the pipeline tests

use crate::schema::{PropertyRecord, TrainingTable};

/// Deterministic table where price is driven by area and building type
pub(crate) fn synthetic_table(rows: usize) -> TrainingTable {
    let types = ["house", "apartment"];
    let sectors = ["north", "south", "east"];
    let mut records = Vec::with_capacity(rows);
    let mut prices = Vec::with_capacity(rows);
    for i in 0..rows {
        let area = 50.0 + (i % 17) as f64 * 10.0;
        let property_type = types[i % types.len()];
        let premium = if property_type == "house" { 20_000.0 } else { 0.0 };
        records.push(PropertyRecord {
            property_type: property_type.to_string(),
            sector: sectors[i % sectors.len()].to_string(),
            net_usable_area: area,
            net_area: area * 1.1 + (i % 3) as f64,
            n_rooms: 1 + (i % 4) as u32,
            n_bathroom: 1 + ((i / 3) % 2) as u32,
            year_built: 1960 + (i % 50) as u32,
        });
        prices.push(1_500.0 * area + premium + (i % 5) as f64 * 100.0);
    }
    TrainingTable::new(records, prices).expect("lengths match")
}
