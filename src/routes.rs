use crate::api::{
    Availability, AvailabilityQuery, DeletePayload, MembershipPayload, PriceQuery, Quote,
    SelectionPatch, SelectionView,
};
use crate::authenticate::{
    AuthApp, AuthError, LoginPayload, RegisterPayload, SessionToken, TokenId, User,
    SESSION_COOKIE,
};
use crate::booker::{Booking, BookingApp, BookingDay, BookingError, Selection};
use crate::dashboard::RevenueReport;
use crate::pricing::{calculate_price, MembershipTier};
use crate::registry::{Desk, TimeSlot};
use axum::{
    debug_handler,
    extract::{Json, Query, Request, State},
    http::{header::SET_COOKIE, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, timeout::TimeoutLayer,
};
use tracing::{debug, error, info, trace};

type Apps = (Arc<RwLock<BookingApp>>, Arc<RwLock<AuthApp>>);
type ApiError = (StatusCode, String);

fn auth_status(e: &AuthError) -> StatusCode {
    match e {
        AuthError::MissingField(_) => StatusCode::BAD_REQUEST,
        AuthError::EmailTaken => StatusCode::CONFLICT,
        AuthError::InvalidCredentials
        | AuthError::NoSession
        | AuthError::InvalidToken
        | AuthError::SessionExpired
        | AuthError::UnknownUser => StatusCode::UNAUTHORIZED,
    }
}

fn booking_status(e: &BookingError) -> StatusCode {
    match e {
        BookingError::Overlap { .. } => StatusCode::CONFLICT,
        BookingError::DeskNotFound(_) | BookingError::SlotNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn booking_error(e: BookingError) -> ApiError {
    debug!("Booking request rejected: {}", e);
    (booking_status(&e), e.to_string())
}

async fn current_user(auth: &RwLock<AuthApp>, cookies: &CookieJar) -> Result<User, ApiError> {
    auth.read()
        .await
        .assert_login(cookies)
        .map(|session| session.user)
        .map_err(|e| (auth_status(&e), e.to_string()))
}

async fn handle_desks(State((booker, _)): State<Apps>) -> Json<Vec<Desk>> {
    Json(booker.read().await.desks().to_vec())
}

async fn handle_time_slots(State((booker, _)): State<Apps>) -> Json<Vec<TimeSlot>> {
    Json(booker.read().await.time_slots().to_vec())
}

async fn handle_bookings(State((booker, _)): State<Apps>) -> Json<Vec<Booking>> {
    Json(booker.read().await.bookings())
}

async fn handle_available(
    State((booker, _)): State<Apps>,
    Query(query): Query<AvailabilityQuery>,
) -> Json<Availability> {
    let available = booker.read().await.is_desk_available(
        query.desk_id,
        query.date,
        query.start_time,
        query.end_time,
    );
    Json(Availability { available })
}

async fn handle_price(Query(query): Query<PriceQuery>) -> Json<Quote> {
    Json(Quote {
        price: calculate_price(query.tier, query.desk_type, query.duration),
    })
}

fn selection_view(booker: &BookingApp, user: &User) -> SelectionView {
    SelectionView {
        selection: booker.selection(user),
        price: booker.quote(user),
    }
}

async fn handle_get_selection(
    State((booker, auth)): State<Apps>,
    cookies: CookieJar,
) -> Result<Json<SelectionView>, ApiError> {
    let user = current_user(&auth, &cookies).await?;
    Ok(Json(selection_view(&*booker.read().await, &user)))
}

/// Applied to a copy of the selection, nothing changes unless every field is accepted.
fn apply_patch(
    booker: &mut BookingApp,
    user: &User,
    patch: SelectionPatch,
) -> Result<(), BookingError> {
    booker.edit_selection(user, |selection| {
        if let Some(tier) = patch.membership_tier {
            selection.set_membership_tier(tier);
        }
        if let Some(date) = patch.date {
            selection.set_date(date)?;
        }
        if patch.clear_desk {
            selection.select_desk(None)?;
        }
        if let Some(desk_id) = patch.desk_id {
            selection.select_desk(Some(desk_id))?;
        }
        if let Some(start) = patch.start_time {
            selection.set_start_time(start)?;
        }
        if let Some(end) = patch.end_time {
            selection.set_end_time(end)?;
        }
        Ok(())
    })
}

async fn handle_patch_selection(
    State((booker, auth)): State<Apps>,
    cookies: CookieJar,
    Json(patch): Json<SelectionPatch>,
) -> Result<Json<SelectionView>, ApiError> {
    let user = current_user(&auth, &cookies).await?;
    let mut booker = booker.write().await;
    apply_patch(&mut booker, &user, patch).map_err(booking_error)?;
    Ok(Json(selection_view(&booker, &user)))
}

#[debug_handler]
async fn handle_new_booking(
    State((booker, auth)): State<Apps>,
    cookies: CookieJar,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let user = current_user(&auth, &cookies).await?;

    match booker.write().await.create_booking(&user) {
        Ok(booking) => Ok((StatusCode::CREATED, Json(booking))),
        Err(e) => Err(booking_error(e)),
    }
}

async fn handle_delete(
    State((booker, auth)): State<Apps>,
    cookies: CookieJar,
    Json(payload): Json<DeletePayload>,
) -> Result<(StatusCode, String), ApiError> {
    debug!("Deleting booking: {:?}", payload);
    let user = current_user(&auth, &cookies).await?;

    let mut booker = booker.write().await;
    let booking = booker
        .booking(&payload.id)
        .ok_or((StatusCode::NOT_FOUND, "Booking does not exist".to_string()))?;

    if booking.user_id != user.id {
        return Err((StatusCode::FORBIDDEN, "Booking belongs to someone else".to_string()));
    }

    //dont allow cancelling past bookings
    if booking.is_past(Local::now().naive_local()) {
        return Err((StatusCode::BAD_REQUEST, "Booking is in the past".to_string()));
    }

    booker.cancel_booking(&payload.id);
    Ok((StatusCode::OK, "Booking cancelled".to_string()))
}

async fn handle_my_bookings(
    State((booker, auth)): State<Apps>,
    cookies: CookieJar,
) -> Result<Json<Vec<BookingDay>>, ApiError> {
    let user = current_user(&auth, &cookies).await?;
    let days = booker
        .read()
        .await
        .user_bookings(&user.id, Local::now().naive_local());
    Ok(Json(days))
}

fn booking_api(apps: Apps) -> Router {
    Router::new()
        .route("/desks", get(handle_desks))
        .route("/timeslots", get(handle_time_slots))
        .route("/events", get(handle_bookings))
        .route("/available", get(handle_available))
        .route("/price", get(handle_price))
        .route(
            "/selection",
            get(handle_get_selection).post(handle_patch_selection),
        )
        .route("/new", post(handle_new_booking))
        .route("/delete", post(handle_delete))
        .route("/mine", get(handle_my_bookings))
        .with_state(apps)
}

async fn handle_dashboard(
    State((booker, auth)): State<Apps>,
    cookies: CookieJar,
) -> Result<Json<RevenueReport>, ApiError> {
    let user = current_user(&auth, &cookies).await?;
    if user.membership_tier != MembershipTier::Executive {
        debug!("{} ({}) denied dashboard", user.email, user.membership_tier);
        return Err((
            StatusCode::FORBIDDEN,
            "Dashboard requires Executive membership".to_string(),
        ));
    }
    Ok(Json(booker.read().await.revenue_report()))
}

fn session_response(
    cookies: CookieJar,
    cookie: String,
    session_token: SessionToken,
) -> Result<(CookieJar, Json<SessionToken>), ApiError> {
    let cookie = Cookie::parse(cookie).map_err(|e| {
        error!("Error building session cookie: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok((cookies.add(cookie), Json(session_token)))
}

async fn handle_register(
    State(auth_app): State<Arc<RwLock<AuthApp>>>,
    cookies: CookieJar,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, CookieJar, Json<SessionToken>), ApiError> {
    let result = auth_app.write().await.register(payload);
    match result {
        Ok((cookie, session_token)) => {
            let (cookies, token) = session_response(cookies, cookie, session_token)?;
            Ok((StatusCode::CREATED, cookies, token))
        }
        Err(e) => {
            debug!("Registration failed: {}", e);
            Err((auth_status(&e), e.to_string()))
        }
    }
}

#[debug_handler]
async fn handle_login(
    State(auth_app): State<Arc<RwLock<AuthApp>>>,
    cookies: CookieJar,
    Json(payload): Json<LoginPayload>,
) -> Result<(StatusCode, CookieJar, Json<SessionToken>), ApiError> {
    let result = auth_app
        .write()
        .await
        .authenticate_user(&payload.email, &payload.password);
    match result {
        Ok((cookie, session_token)) => {
            debug!("login succesful");
            let (cookies, token) = session_response(cookies, cookie, session_token)?;
            Ok((StatusCode::OK, cookies, token))
        }
        Err(e) => {
            debug!("Error logging in: {}", e);
            Err((auth_status(&e), e.to_string()))
        }
    }
}

async fn check_login(
    State(auth_app): State<Arc<RwLock<AuthApp>>>,
    cookies: CookieJar,
) -> Result<(StatusCode, Json<SessionToken>), StatusCode> {
    let session_token = auth_app
        .read()
        .await
        .assert_login(&cookies)
        .map_err(|_| StatusCode::OK)?;

    Ok((StatusCode::ACCEPTED, Json(session_token)))
}

async fn handle_logout(
    State(auth_app): State<Arc<RwLock<AuthApp>>>,
    cookies: CookieJar,
) -> Result<(StatusCode, CookieJar), ApiError> {
    let logout = |e: AuthError| {
        error!("Error logging out: {}", e);
        (auth_status(&e), e.to_string())
    };
    let token_id = TokenId::try_from(
        cookies
            .get(SESSION_COOKIE)
            .ok_or(AuthError::NoSession)
            .map_err(logout)?
            .value(),
    )
    .map_err(logout)?;

    auth_app.write().await.logout(&token_id).map_err(logout)?;
    debug!("logout succesful");

    let mut removal = Cookie::from(SESSION_COOKIE);
    removal.set_path("/");
    Ok((StatusCode::OK, cookies.remove(removal)))
}

async fn handle_membership(
    State(auth_app): State<Arc<RwLock<AuthApp>>>,
    cookies: CookieJar,
    Json(payload): Json<MembershipPayload>,
) -> Result<Json<User>, ApiError> {
    let user = current_user(&auth_app, &cookies).await?;
    auth_app
        .write()
        .await
        .update_membership(&user.id, payload.membership_tier)
        .map(Json)
        .map_err(|e| (auth_status(&e), e.to_string()))
}

async fn handle_schema() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "Booking": schemars::schema_for!(Booking),
        "Desk": schemars::schema_for!(Desk),
        "TimeSlot": schemars::schema_for!(TimeSlot),
        "Selection": schemars::schema_for!(Selection),
        "SelectionPatch": schemars::schema_for!(SelectionPatch),
        "BookingDay": schemars::schema_for!(BookingDay),
        "RevenueReport": schemars::schema_for!(RevenueReport),
        "RegisterPayload": schemars::schema_for!(RegisterPayload),
        "LoginPayload": schemars::schema_for!(LoginPayload),
        "SessionToken": schemars::schema_for!(SessionToken),
    }))
}

fn auth_api(auth_app: Arc<RwLock<AuthApp>>) -> Router {
    Router::new()
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/login", get(check_login))
        .route("/logout", get(handle_logout))
        .route("/membership", post(handle_membership))
        .with_state(auth_app)
}

async fn cookie_helper(
    cookies: CookieJar,
    auth_app: Arc<RwLock<AuthApp>>,
) -> Result<CookieJar, Box<dyn std::error::Error>> {
    let cookie = cookies.get(SESSION_COOKIE).ok_or("No cookie found")?;
    let token_id = TokenId::try_from(cookie.value())?;
    let cookie = auth_app
        .write()
        .await
        .update_token(&token_id)
        .map_err(|e| format!("Error updating token: {}", e))?;

    Ok(cookies.add(Cookie::parse(cookie)?))
}

/// Slide the session expiry forward on every request carrying a live session.
async fn update_token(
    State(auth_app): State<Arc<RwLock<AuthApp>>>,
    cookies: CookieJar,
    request: Request,
    next: Next,
) -> (CookieJar, Response) {
    trace!("{}, {}", request.method(), request.uri().path());
    let response = next.run(request).await;

    // login, register and logout set the cookie themselves
    if response.headers().contains_key(SET_COOKIE) {
        return (CookieJar::new(), response);
    }
    (
        cookie_helper(cookies, auth_app)
            .await
            .unwrap_or(CookieJar::new()),
        response,
    )
}

/// The full API, with booking state and sessions shared across requests.
pub fn app(book_app: Arc<RwLock<BookingApp>>, auth_app: Arc<RwLock<AuthApp>>) -> Router {
    info!("Building router");

    let middleware = tower::ServiceBuilder::new()
        .layer(CompressionLayer::new().quality(tower_http::CompressionLevel::Fastest))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(
            auth_app.clone(),
            update_token,
        ));

    let dashboard = Router::new()
        .route("/dashboard", get(handle_dashboard))
        .with_state((book_app.clone(), auth_app.clone()));

    let api = auth_api(auth_app.clone())
        .merge(dashboard)
        .route("/schema", get(handle_schema))
        .nest("/book", booking_api((book_app, auth_app)));

    Router::new().nest("/api", api).layer(middleware)
}
