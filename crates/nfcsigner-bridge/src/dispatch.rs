//! Request handlers.
//!
//! Each handler runs one combined flow on an open [`CardSession`]. The
//! `execute_*` entry points add channel scoping: connect before, disconnect
//! after, on every path.

use nfcsigner_core::card::command::parse_aid;
use nfcsigner_core::ccid::BulkPipe;
use nfcsigner_core::transport::UsbReader;
use nfcsigner_core::{CardSession, KeyRole, SessionConfig, Transport};
use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::request::{Request, Response, SignedData};

/// Role whose certificate accompanies a signature.
const SIGNING_ROLE: KeyRole = KeyRole::Sig;

/// Selects the applet named by `applet_id` (hex).
///
/// # Errors
///
/// - [`BridgeError::InvalidParameters`] if `applet_id` is not valid hex
/// - [`BridgeError::AppletNotSelected`] if the card refuses the SELECT
pub fn select<T: Transport>(card: &mut CardSession<T>, applet_id: &str) -> BridgeResult<()> {
    let aid = parse_aid(applet_id)?;
    debug!(aid = %hex::encode_upper(&aid), "selecting applet");

    if card.select_applet(&aid)? {
        Ok(())
    } else {
        Err(BridgeError::AppletNotSelected)
    }
}

/// Selects the applet and verifies `pin`.
///
/// # Errors
///
/// Returns [`BridgeError::AuthFailed`] with the remaining tries if the PIN
/// is rejected, or any error from [`select`].
pub fn select_and_verify<T: Transport>(
    card: &mut CardSession<T>,
    applet_id: &str,
    pin: &str,
) -> BridgeResult<()> {
    select(card, applet_id)?;

    let outcome = card.verify_pin(pin)?;
    if outcome.verified {
        Ok(())
    } else {
        warn!(tries_left = outcome.tries_left, "PIN rejected");
        Err(BridgeError::AuthFailed {
            tries_left: outcome.tries_left,
        })
    }
}

/// Selects, verifies and signs `data`.
///
/// # Errors
///
/// Returns [`BridgeError::SigningFailed`] carrying the status word if the
/// card refuses to sign, or any error from [`select_and_verify`].
pub fn sign<T: Transport>(
    card: &mut CardSession<T>,
    applet_id: &str,
    pin: &str,
    data: &[u8],
    key_index: i64,
) -> BridgeResult<Vec<u8>> {
    select_and_verify(card, applet_id, pin)?;
    signature(card, data, key_index)
}

fn signature<T: Transport>(
    card: &mut CardSession<T>,
    data: &[u8],
    key_index: i64,
) -> BridgeResult<Vec<u8>> {
    card.generate_signature(data, key_index).map_err(|err| {
        if err.status_word().is_some() {
            BridgeError::SigningFailed(err)
        } else {
            err.into()
        }
    })
}

/// Selects and reads the public key for `role`.
///
/// The role is checked before the card is touched.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidParameters`] for an unknown role, or any
/// error from [`select`].
pub fn public_key<T: Transport>(
    card: &mut CardSession<T>,
    applet_id: &str,
    role: &str,
) -> BridgeResult<Vec<u8>> {
    let role: KeyRole = role.parse()?;
    select(card, applet_id)?;
    Ok(card.public_key(role)?)
}

/// Selects and reads the certificate for `role`.
///
/// # Errors
///
/// - [`BridgeError::InvalidParameters`] for an unknown role
/// - [`BridgeError::CertificateUnavailable`] if the card refuses either
///   certificate exchange
pub fn certificate<T: Transport>(
    card: &mut CardSession<T>,
    applet_id: &str,
    role: &str,
) -> BridgeResult<Vec<u8>> {
    let role: KeyRole = role.parse()?;
    select(card, applet_id)?;
    read_certificate(card, role)
}

fn read_certificate<T: Transport>(card: &mut CardSession<T>, role: KeyRole) -> BridgeResult<Vec<u8>> {
    card.certificate(role).map_err(|err| {
        if err.status_word().is_some() {
            BridgeError::CertificateUnavailable(err)
        } else {
            err.into()
        }
    })
}

/// Signs `data`, then reads the signing certificate.
///
/// # Errors
///
/// Any error from [`sign`], or [`BridgeError::CertificateUnavailable`].
pub fn sign_with_certificate<T: Transport>(
    card: &mut CardSession<T>,
    applet_id: &str,
    pin: &str,
    data: &[u8],
    key_index: i64,
) -> BridgeResult<SignedData> {
    let signature = sign(card, applet_id, pin, data, key_index)?;
    let certificate = read_certificate(card, SIGNING_ROLE)?;
    Ok(SignedData::new(&certificate, &signature))
}

/// Runs `request` on a session whose channel is already open.
///
/// # Errors
///
/// Whatever the matching handler returns.
pub fn execute<T: Transport>(card: &mut CardSession<T>, request: &Request) -> BridgeResult<Response> {
    debug!(method = request.method(), "executing request");

    match request {
        Request::SelectAndVerify { applet_id, pin } => {
            select_and_verify(card, applet_id, pin).map(|()| Response::Verified)
        }
        Request::GenerateSignature {
            applet_id,
            pin,
            data_to_sign,
            key_index,
        } => sign(card, applet_id, pin, data_to_sign, *key_index).map(Response::Bytes),
        Request::GetRsaPublicKey {
            applet_id,
            key_role,
        } => public_key(card, applet_id, key_role).map(Response::Bytes),
        Request::GetCertificate {
            applet_id,
            key_role,
        } => certificate(card, applet_id, key_role).map(Response::Bytes),
        Request::SignWithCertificate {
            applet_id,
            pin,
            data_to_sign,
            key_index,
        } => sign_with_certificate(card, applet_id, pin, data_to_sign, *key_index)
            .map(Response::Signed),
    }
}

/// Connects `transport`, runs `request`, then disconnects.
///
/// # Errors
///
/// Returns [`BridgeError::Communication`] if the channel cannot be opened,
/// otherwise whatever [`execute`] returns.
pub fn execute_with_card<T: Transport>(
    transport: &mut T,
    config: &SessionConfig,
    request: &Request,
) -> BridgeResult<Response> {
    transport.connect().map_err(BridgeError::Communication)?;

    let mut card = CardSession::with_config(&mut *transport, config);
    let result = execute(&mut card, request);
    transport.disconnect();
    result
}

/// Runs `request` inside a fresh CCID session on `reader`.
///
/// # Errors
///
/// - [`BridgeError::UsbConnectionFailed`] if the card cannot be powered on
/// - [`BridgeError::UsbCommunication`] if the channel fails mid-session
/// - otherwise whatever [`execute`] returns
pub fn execute_with_usb<P: BulkPipe>(
    reader: &mut UsbReader<P>,
    request: &Request,
) -> BridgeResult<Response> {
    match reader.with_session(|card| Ok(execute(card, request))) {
        Ok(result) => result.map_err(BridgeError::over_usb),
        Err(err) => {
            warn!(error = %err, "USB session could not be opened");
            Err(BridgeError::UsbConnectionFailed(err))
        }
    }
}
