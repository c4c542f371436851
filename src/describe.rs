//! Turns detector output into the photo description text.

use crate::detect::Detection;

pub const DELIMITER: &str = ". ";

/// Render detections as `"<label> : <percent>"` entries joined by `". "`.
///
/// Confidence is truncated to a whole percent. An empty slice gives an empty
/// string, which callers treat as "no description".
pub fn synthesize(detections: &[Detection]) -> String {
    detections
        .iter()
        .map(|d| format!("{} : {}", d.label, percent(d.confidence)))
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

fn percent(confidence: f32) -> i64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 100.0).trunc() as i64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_detection() {
        assert_eq!(synthesize(&[Detection::new("dog", 87.3)]), "dog : 87");
    }

    #[test]
    fn test_joins_in_order() {
        let dets = vec![
            Detection::new("person", 99.9),
            Detection::new("dog", 87.3),
            Detection::new("sports ball", 41.0),
        ];
        assert_eq!(synthesize(&dets), "person : 99. dog : 87. sports ball : 41");
    }

    #[test]
    fn test_empty_is_empty_string() {
        assert_eq!(synthesize(&[]), "");
    }

    #[test]
    fn test_is_repeatable() {
        let dets = vec![Detection::new("cat", 12.7), Detection::new("cup", 5.0)];
        assert_eq!(synthesize(&dets), synthesize(&dets));
    }

    #[test]
    fn test_out_of_range_confidence() {
        assert_eq!(synthesize(&[Detection::new("x", 140.0)]), "x : 100");
        assert_eq!(synthesize(&[Detection::new("y", f32::NAN)]), "y : 0");
    }
}
