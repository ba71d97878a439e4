use harbour_db::{Column, ColumnName, TypedColumn};

use crate::model;

#[derive(Debug)]
pub struct Reservation;

impl ColumnName for Reservation {
    const NAME: &'static str = "reservation";
}

impl Column for Reservation {
    type Index = model::ReservationKey;
}

impl TypedColumn for Reservation {
    type Type = model::Reservation;
}

#[derive(Debug)]
pub struct Masternode;

impl ColumnName for Masternode {
    const NAME: &'static str = "masternode";
}

impl Column for Masternode {
    type Index = String;
}

impl TypedColumn for Masternode {
    type Type = model::Masternode;
}

#[derive(Debug)]
pub struct Withdrawal;

impl ColumnName for Withdrawal {
    const NAME: &'static str = "withdrawal_queue";
}

impl Column for Withdrawal {
    type Index = u64;
}

impl TypedColumn for Withdrawal {
    type Type = model::PendingWithdrawal;
}

pub const COLUMN_NAMES: [&str; 3] = [Reservation::NAME, Masternode::NAME, Withdrawal::NAME];
