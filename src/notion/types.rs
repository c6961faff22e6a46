/// Snapshot of one tracked page, taken fresh every cycle
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
  pub id: String,
  pub description: String,
  pub measurement_value: f64,
  /// None when the status property is not a checkbox
  pub checkbox_state: Option<bool>,
}
