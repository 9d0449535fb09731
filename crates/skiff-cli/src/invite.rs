//! Invitation and confirmation message bodies.
//!
//! Delivery is out of band - paste the text into whatever channel reaches
//! the other side. The invitation carries everything a receiver needs to
//! connect; the confirmation carries the address a transmitter must
//! whitelist.

use std::net::IpAddr;

/// Message inviting a receiver to pull from this host.
pub fn invitation(ip: IpAddr, port: u16, public_key: &[u8; 32]) -> String {
    format!(
        "Subject: skiff: file transfer offer\n\
         \n\
         Hello, this host would like to send you something.\n\
         \n\
         Pick a directory to receive into, then run the receiver with the\n\
         connection details below:\n\
         \n\
         IP: {ip}\n\
         Port: {port}\n\
         Public encryption key: {key}\n\
         \n\
         Reply with your own IP address so it can be whitelisted, then\n\
         start your receiver.\n",
        key = hex::encode(public_key),
    )
}

/// Message confirming a transfer offer, sent back to the transmitter.
pub fn confirmation(ip: IpAddr) -> String {
    format!(
        "Subject: skiff: file transfer accepted\n\
         \n\
         Hello, this host is ready to receive your files.\n\
         \n\
         Add the address below to your whitelist and start the\n\
         transmitter:\n\
         \n\
         IP: {ip}\n",
    )
}
