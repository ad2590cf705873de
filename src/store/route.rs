use crate::error::{constants, NemoriaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator used by the textual form of a route (`user/profile/name`).
pub const ROUTE_SEPARATOR: char = '/';

/// Ordered, non-empty sequence of segments addressing a location in the store.
///
/// Segments are compared by exact value and must not be empty. A route of
/// length one addresses a top-level entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Route {
    segments: Vec<String>,
}

impl Route {
    /// Build a route from any sequence of segments.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(NemoriaError::InvalidRoute(constants::ERR_EMPTY_ROUTE.into()));
        }
        if let Some(pos) = segments.iter().position(String::is_empty) {
            return Err(NemoriaError::InvalidRoute(format!(
                "{} (segment {pos})",
                constants::ERR_EMPTY_SEGMENT
            )));
        }
        Ok(Self { segments })
    }

    /// Single-segment route.
    pub fn top(segment: impl Into<String>) -> Result<Self> {
        Self::new([segment.into()])
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_top_level(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn last(&self) -> &str {
        // non-empty by construction
        &self.segments[self.segments.len() - 1]
    }

    /// All segments except the last one.
    pub fn prefix(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    /// Route of the parent node, `None` for top-level routes.
    pub fn parent(&self) -> Option<Route> {
        if self.is_top_level() {
            None
        } else {
            Some(Route {
                segments: self.prefix().to_vec(),
            })
        }
    }

    /// Extend this route by one segment.
    pub fn child(&self, segment: impl Into<String>) -> Result<Route> {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Route::new(segments)
    }

    /// Whether `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &Route) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{ROUTE_SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl FromStr for Route {
    type Err = NemoriaError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(NemoriaError::InvalidRoute(constants::ERR_EMPTY_ROUTE.into()));
        }
        Route::new(s.split(ROUTE_SEPARATOR))
    }
}

impl TryFrom<Vec<String>> for Route {
    type Error = NemoriaError;

    fn try_from(segments: Vec<String>) -> Result<Self> {
        Route::new(segments)
    }
}

impl From<Route> for Vec<String> {
    fn from(route: Route) -> Self {
        route.segments
    }
}

/// Anything the client API accepts where a route is expected.
///
/// Strings are split on [`ROUTE_SEPARATOR`]; build a [`Route`] with
/// [`Route::new`] when a segment itself contains a `/`.
pub trait IntoRoute {
    fn into_route(self) -> Result<Route>;
}

impl IntoRoute for Route {
    fn into_route(self) -> Result<Route> {
        Ok(self)
    }
}

impl IntoRoute for &Route {
    fn into_route(self) -> Result<Route> {
        Ok(self.clone())
    }
}

impl IntoRoute for &str {
    fn into_route(self) -> Result<Route> {
        self.parse()
    }
}

impl IntoRoute for String {
    fn into_route(self) -> Result<Route> {
        self.parse()
    }
}

impl IntoRoute for &[&str] {
    fn into_route(self) -> Result<Route> {
        Route::new(self.iter().copied())
    }
}

impl<const N: usize> IntoRoute for [&str; N] {
    fn into_route(self) -> Result<Route> {
        Route::new(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn rejects_empty_routes_and_segments() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(Route::new(empty).unwrap_err().kind(), ErrorKind::InvalidRoute);
        assert_eq!(
            Route::new(["user", "", "name"]).unwrap_err().kind(),
            ErrorKind::InvalidRoute
        );
        assert_eq!("".parse::<Route>().unwrap_err().kind(), ErrorKind::InvalidRoute);
        assert_eq!("a//b".parse::<Route>().unwrap_err().kind(), ErrorKind::InvalidRoute);
    }

    #[test]
    fn display_and_parse_agree() {
        let route = Route::new(["user", "profile", "name"]).unwrap();
        assert_eq!(route.to_string(), "user/profile/name");
        assert_eq!("user/profile/name".parse::<Route>().unwrap(), route);
    }

    #[test]
    fn parent_and_prefix() {
        let route: Route = "one/two/3".parse().unwrap();
        assert_eq!(route.last(), "3");
        assert_eq!(route.prefix(), &["one".to_string(), "two".to_string()]);
        assert_eq!(route.parent().unwrap().to_string(), "one/two");
        assert!(Route::top("one").unwrap().parent().is_none());
        assert!(route.starts_with(&Route::top("one").unwrap()));
    }

    #[test]
    fn deserialization_revalidates() {
        let bytes = bincode::serialize(&Vec::<String>::new()).unwrap();
        assert!(bincode::deserialize::<Route>(&bytes).is_err());

        let route = Route::new(["a", "b"]).unwrap();
        let bytes = bincode::serialize(&route).unwrap();
        assert_eq!(bincode::deserialize::<Route>(&bytes).unwrap(), route);
    }
}
