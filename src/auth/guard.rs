/// Authorization guards
///
/// The ephemeral identity installed by the request authenticator, plus the
/// guard functions protected handlers call before touching the database.

use std::collections::HashSet;

use crate::auth::claims::Claims;
use crate::auth::role::{Permission, Role};
use crate::error::{AppError, AuthError};

/// Identity derived purely from decoded access-token claims. No database
/// read happens on the authenticated path.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub email: String,
    pub role: Role,
    pub authorities: HashSet<&'static str>,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            email: claims.sub.clone(),
            role: claims.role,
            authorities: claims.role.authorities(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Require an authenticated caller holding the given permission.
///
/// `Unauthorized` when no identity is present, `Forbidden` when the identity
/// lacks the permission.
pub fn authorize(
    user: Option<&AuthenticatedUser>,
    required: Permission,
) -> Result<&AuthenticatedUser, AppError> {
    let user = user.ok_or(AppError::Auth(AuthError::Unauthorized))?;

    if !user.role.has_permission(required) {
        tracing::warn!(
            email = %user.email,
            required = required.as_str(),
            "Permission denied"
        );
        return Err(AppError::Auth(AuthError::Forbidden));
    }

    Ok(user)
}

/// Require any authenticated caller.
pub fn require_authenticated(
    user: Option<&AuthenticatedUser>,
) -> Result<&AuthenticatedUser, AppError> {
    user.ok_or(AppError::Auth(AuthError::Unauthorized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::TokenType;

    fn user_ctx(role: Role) -> AuthenticatedUser {
        let claims = Claims::new("someone@example.com", role, TokenType::Access, 300);
        AuthenticatedUser::from_claims(&claims)
    }

    #[test]
    fn anonymous_caller_is_unauthorized() {
        let result = authorize(None, Permission::UserRead);
        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::Unauthorized))
        ));
    }

    #[test]
    fn user_cannot_use_admin_permission() {
        let ctx = user_ctx(Role::User);
        let result = authorize(Some(&ctx), Permission::AdminWrite);
        assert!(matches!(result, Err(AppError::Auth(AuthError::Forbidden))));
    }

    #[test]
    fn admin_passes_user_level_checks() {
        let ctx = user_ctx(Role::Admin);
        assert!(authorize(Some(&ctx), Permission::UserWrite).is_ok());
        assert!(authorize(Some(&ctx), Permission::AdminWrite).is_ok());
    }

    #[test]
    fn identity_reflects_claims() {
        let claims = Claims::new("admin@example.com", Role::Admin, TokenType::Access, 300);
        let ctx = AuthenticatedUser::from_claims(&claims);

        assert_eq!(ctx.email, "admin@example.com");
        assert!(ctx.is_admin());
        assert!(ctx.authorities.contains("admin:write"));
        assert!(ctx.authorities.contains("user:read"));
    }
}
