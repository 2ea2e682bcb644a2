/// Largest datagram the UDP transport reads in one `recv_from`.
///
/// One datagram carries exactly one JSON command; anything longer is truncated
/// by the socket and then rejected as malformed.
pub const MAX_DATAGRAM_LEN: usize = 64 * 1024;
