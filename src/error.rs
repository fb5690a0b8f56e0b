// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error type for the configuration surface.
//!
//! The controller itself never fails: bad RTT samples are dropped and broken
//! window values are repaired in place. Errors only come from building or
//! loading a configuration.

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// WRC configuration error.
#[derive(Clone, Debug, PartialEq, Eq, EnumIter)]
pub enum Error {
    /// The configuration is invalid, or a name (profile, algorithm) is
    /// unknown.
    InvalidConfig(String),

    /// I/O error while reading a configuration file.
    IoError(String),
}

impl Error {
    /// Return the error number using by the C caller.
    #[cfg_attr(not(feature = "ffi"), allow(dead_code))]
    pub(crate) fn to_errno(&self) -> libc::ssize_t {
        match self {
            Error::InvalidConfig(_) => -1,
            Error::IoError(_) => -2,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(format!("{}", err))
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidConfig(format!("{}", err))
    }
}
