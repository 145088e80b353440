pub mod http;

/// Last path segment of a Google resource name.
///
/// `projects/p/locations/global/knowledgeBases/abc` → `abc`.
pub fn resource_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
