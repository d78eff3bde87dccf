//! Encoded polyline decoding (precision 1e5)

use crate::error::MapsError;
use crate::model::LatLng;

/// Decode an encoded polyline into its points.
pub fn decode(encoded: &str) -> Result<Vec<LatLng>, MapsError> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while index < bytes.len() {
        lat = accumulate(lat, next_delta(bytes, &mut index)?, index)?;
        lng = accumulate(lng, next_delta(bytes, &mut index)?, index)?;
        points.push(LatLng {
            lat: lat as f64 / 1e5,
            lng: lng as f64 / 1e5,
        });
    }

    Ok(points)
}

/// Decode to `[lng, lat]` pairs, the order map renderers expect.
pub fn decode_lng_lat(encoded: &str) -> Result<Vec<[f64; 2]>, MapsError> {
    Ok(decode(encoded)?.into_iter().map(|p| [p.lng, p.lat]).collect())
}

fn accumulate(total: i64, delta: i64, index: usize) -> Result<i64, MapsError> {
    total
        .checked_add(delta)
        .ok_or_else(|| MapsError::Polyline(format!("coordinate overflow at byte {}", index)))
}

fn next_delta(bytes: &[u8], index: &mut usize) -> Result<i64, MapsError> {
    let mut result: i64 = 0;
    let mut shift = 0;
    loop {
        let byte = *bytes
            .get(*index)
            .ok_or_else(|| MapsError::Polyline(format!("truncated at byte {}", index)))?;
        if !(63..=126).contains(&byte) {
            return Err(MapsError::Polyline(format!(
                "invalid character {:?} at byte {}",
                byte as char, index
            )));
        }
        if shift > 60 {
            return Err(MapsError::Polyline(format!("value overflow at byte {}", index)));
        }
        *index += 1;

        let chunk = (byte - 63) as i64;
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }

    Ok(if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    })
}
