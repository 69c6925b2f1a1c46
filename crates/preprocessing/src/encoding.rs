//! Label encoding of categorical columns
//!
//! Distinct values are sorted (numerically for numeric columns, by string
//! otherwise) and mapped to dense codes `0..k`.

use hotel_core::errors::{PipelineError, Result, Stage};
use hotel_core::table::{format_number, Column};
use std::collections::{BTreeMap, HashMap};

/// Fitted mapping from the distinct values of one column to dense codes
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelEncoder {
    /// Learn the vocabulary of `column`
    pub fn fit(column: &Column) -> Self {
        let classes: Vec<String> = match column {
            Column::Numeric(values) => {
                let mut sorted = values.clone();
                sorted.sort_by(f64::total_cmp);
                sorted.dedup_by(|a, b| a.total_cmp(b).is_eq());
                sorted.into_iter().map(format_number).collect()
            }
            Column::Text(values) => {
                let mut sorted = values.clone();
                sorted.sort();
                sorted.dedup();
                sorted
            }
        };
        let index = classes
            .iter()
            .enumerate()
            .map(|(code, class)| (class.clone(), code))
            .collect();
        Self { classes, index }
    }

    /// Distinct values in code order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn code_of(&self, value: &str) -> Option<usize> {
        self.index.get(value).copied()
    }

    /// Value → code, for logging
    pub fn mapping(&self) -> BTreeMap<String, usize> {
        self.index.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// Replace every value by its code
    ///
    /// Fails on the first value outside the fitted vocabulary.
    pub fn transform(&self, column: &Column) -> Result<Column> {
        let mut codes = Vec::with_capacity(column.len());
        for row in 0..column.len() {
            let key = column.cell_key(row);
            let code = self.code_of(&key).ok_or_else(|| {
                PipelineError::new(
                    Stage::Preprocessing,
                    "encode categorical column",
                    "value was not seen when the encoder was fit",
                )
                .with_context("value", &key)
                .with_context("row", row)
                .with_context("known_values", self.classes.len())
            })?;
            codes.push(code as f64);
        }
        Ok(Column::Numeric(codes))
    }

    pub fn fit_transform(column: &Column) -> Result<(Self, Column)> {
        let encoder = Self::fit(column);
        let encoded = encoder.transform(column)?;
        Ok((encoder, encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use proptest::prelude::*;

    fn text(values: &[&str]) -> Column {
        Column::Text(values.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_text_classes_sorted() -> Result<()> {
        let column = text(&["Online", "Offline", "Corporate", "Online"]);
        let (encoder, encoded) = LabelEncoder::fit_transform(&column)?;

        assert_eq!(encoder.classes(), ["Corporate", "Offline", "Online"]);
        assert_eq!(encoded, Column::Numeric(vec![2.0, 1.0, 0.0, 2.0]));
        Ok(())
    }

    #[test]
    fn test_numeric_classes_sort_numerically() -> Result<()> {
        let column = Column::Numeric(vec![10.0, 2.0, 2.0, 1.0]);
        let (encoder, encoded) = LabelEncoder::fit_transform(&column)?;

        assert_eq!(encoder.classes(), ["1", "2", "10"]);
        assert_eq!(encoded, Column::Numeric(vec![2.0, 1.0, 1.0, 0.0]));
        Ok(())
    }

    #[test]
    fn test_unseen_value_is_reported() {
        let encoder = LabelEncoder::fit(&text(&["Canceled", "Not_Canceled"]));
        let err = encoder.transform(&text(&["Canceled", "Pending"])).unwrap_err();

        assert_eq!(err.stage, Stage::Preprocessing);
        assert_eq!(err.context_value("value"), Some("Pending"));
        assert_eq!(err.context_value("row"), Some("1"));
    }

    proptest! {
        #[test]
        fn encoding_is_a_dense_bijection(values in proptest::collection::vec("[a-e]{1,2}", 1..60)) {
            let column = Column::Text(values.clone());
            let (encoder, encoded) = LabelEncoder::fit_transform(&column).unwrap();
            let codes = encoded.as_numeric().unwrap().to_vec();

            let k = encoder.len();
            prop_assert!(codes.iter().all(|&c| c >= 0.0 && c < k as f64));
            let mut used: Vec<usize> = codes.iter().map(|&c| c as usize).collect();
            used.sort_unstable();
            used.dedup();
            prop_assert_eq!(used, (0..k).collect::<Vec<_>>());

            for (value, code) in values.iter().zip(&codes) {
                prop_assert_eq!(&encoder.classes()[*code as usize], value);
            }

            prop_assert_eq!(encoder.transform(&column).unwrap(), encoded.clone());
            let (_, reencoded) = LabelEncoder::fit_transform(&encoded).unwrap();
            prop_assert_eq!(reencoded, encoded);
        }
    }
}
