use std::collections::BTreeMap;

/// Label set of one series. Keys iterate in sorted order, which is the
/// canonical order for hashing, comparison and rendering.
pub type Labels = BTreeMap<String, String>;

/// Builds a [`Labels`] map from `name => value` pairs.
///
/// ```
/// let labels = pdexp_metrics::labels! { "teamID" => "P1", "teamName" => "Ops" };
/// assert_eq!(labels["teamName"], "Ops");
/// ```
#[macro_export]
macro_rules! labels {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut labels = $crate::Labels::new();
        $(labels.insert(($key).to_string(), ($value).to_string());)*
        labels
    }};
}

pub fn label_names(labels: &Labels) -> Vec<String> {
    labels.keys().cloned().collect()
}
