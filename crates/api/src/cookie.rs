//! Refresh-token session cookie.
//!
//! The refresh token lives only here: HttpOnly (unreadable from script),
//! Secure, cross-site-capable, Max-Age equal to the refresh TTL. It never
//! appears in a JSON body, request header, or log line. Clearing re-issues the
//! cookie with identical name/path/site attributes and a zero Max-Age;
//! browsers treat any attribute mismatch as a different cookie and would leave
//! the original in place.

use tower_cookies::{
    cookie::{time::Duration as CookieDuration, SameSite},
    Cookie, Cookies,
};

pub const REFRESH_COOKIE: &str = "refresh_token";

fn refresh_cookie(value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(REFRESH_COOKIE, value);
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_same_site(SameSite::None);
    cookie.set_path("/");
    cookie
}

/// Attach the refresh token after a successful login or refresh.
pub fn set_refresh_cookie(cookies: &Cookies, token: String, max_age: chrono::Duration) {
    let mut cookie = refresh_cookie(token);
    cookie.set_max_age(CookieDuration::seconds(max_age.num_seconds()));
    cookies.add(cookie);
}

/// Clear the refresh cookie with attribute parity to the set path.
pub fn clear_refresh_cookie(cookies: &Cookies) {
    let mut cookie = refresh_cookie(String::new());
    cookie.set_max_age(CookieDuration::ZERO);
    cookies.add(cookie);
}
