use rand::RngCore;
use time::OffsetDateTime;

/// Mints a shareable tracking id of the form `PRCL-YYYYMMDD-XXXXXX`.
///
/// The suffix is six uppercase hex characters from three random bytes, so
/// two parcels paid on the same day collide with odds of about 1 in 16
/// million. No uniqueness check is made against stored records.
pub fn generate_tracking_id() -> String {
    let date = OffsetDateTime::now_utc().date();

    let mut random = [0u8; 3];
    rand::rngs::OsRng.fill_bytes(&mut random);

    format!(
        "PRCL-{:04}{:02}{:02}-{:02X}{:02X}{:02X}",
        date.year(),
        u8::from(date.month()),
        date.day(),
        random[0],
        random[1],
        random[2],
    )
}
