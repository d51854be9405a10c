use crate::client::backend::Backend;
use crate::common::{BackendError, Profile, UserId};

#[derive(Debug)]
pub struct UsersService;

impl UsersService {
    /// Finds people to start a conversation with. The signed-in user is never
    /// among the results, and a blank query returns nothing without calling
    /// the backend.
    pub async fn search(
        backend: &dyn Backend,
        me: &UserId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Profile>, BackendError> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        // one extra row so that dropping ourselves still fills the page
        let mut found = backend.search_users(query, limit + 1).await?;
        found.retain(|p| &p.id != me);
        found.truncate(limit);
        Ok(found)
    }
}
