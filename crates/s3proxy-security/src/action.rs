//! Action extraction from the raw query string.

/// The S3 sub-resource action named by `raw_query`, if any.
///
/// Only the first `&`-delimited token is considered. A token without `=` is a
/// bare sub-resource such as `uploads` or `acl` and is returned lowercased;
/// anything else means there is no action.
///
/// ```
/// use s3proxy_security::action_from_query;
///
/// assert_eq!(action_from_query(Some("ACL")), Some("acl".to_owned()));
/// assert_eq!(action_from_query(Some("uploads&prefix=a")), Some("uploads".to_owned()));
/// assert_eq!(action_from_query(Some("prefix=a&uploads")), None);
/// assert_eq!(action_from_query(None), None);
/// ```
#[must_use]
pub fn action_from_query(raw_query: Option<&str>) -> Option<String> {
    let query = raw_query.filter(|q| !q.is_empty())?;
    let first = query.split('&').next()?;
    if first.is_empty() || first.contains('=') {
        return None;
    }
    Some(first.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_extract_bare_subresource_action() {
        assert_eq!(action_from_query(Some("tagging")), Some("tagging".to_owned()));
        assert_eq!(action_from_query(Some("Uploads")), Some("uploads".to_owned()));
    }

    #[test]
    fn test_should_return_none_for_key_value_first_token() {
        assert_eq!(action_from_query(Some("list-type=2&prefix=foo")), None);
        assert_eq!(action_from_query(Some("uploadId=abc")), None);
    }

    #[test]
    fn test_should_return_none_for_empty_query() {
        assert_eq!(action_from_query(Some("")), None);
        assert_eq!(action_from_query(Some("&acl")), None);
        assert_eq!(action_from_query(None), None);
    }
}
