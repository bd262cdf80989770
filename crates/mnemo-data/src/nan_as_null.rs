//! `serde(with)` adapters for float data with missing values
//!
//! JSON has no NaN, so missing values are written as `null` and read back as
//! `NaN`. The module itself adapts `Vec<f64>`; [`array2`] adapts `Array2<f64>`.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Row {
//!     #[serde(with = "mnemo_data::nan_as_null")]
//!     values: Vec<f64>,
//! }
//!
//! let json = serde_json::to_string(&Row { values: vec![1.5, f64::NAN] })?;
//! assert_eq!(json, r#"{"values":[1.5,null]}"#);
//! let row: Row = serde_json::from_str(&json)?;
//! assert!(row.values[1].is_nan());
//! # Ok::<(), serde_json::Error>(())
//! ```

use serde::{Deserialize as _, Deserializer, Serializer};

fn to_option(v: f64) -> Option<f64> {
    (!v.is_nan()).then_some(v)
}

pub fn serialize<S>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(values.iter().copied().map(to_option))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Option<f64>>::deserialize(deserializer)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Row-major `{"dim": [rows, cols], "data": [...]}`.
pub mod array2 {
    use ndarray::Array2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

    #[derive(Serialize, Deserialize)]
    struct Grid {
        dim: (usize, usize),
        data: Vec<Option<f64>>,
    }

    pub fn serialize<S>(values: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Grid {
            dim: values.dim(),
            data: values.iter().copied().map(super::to_option).collect(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Array2<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Grid { dim, data } = Grid::deserialize(deserializer)?;
        let data = data.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        Array2::from_shape_vec(dim, data).map_err(D::Error::custom)
    }
}
