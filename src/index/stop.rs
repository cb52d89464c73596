// src/index/stop.rs

//! Stop words excluded from indexing and queries.

use std::collections::HashSet;
use std::sync::OnceLock;

static STOP_WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();

/// True if `word` is on the closed stop-word list.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS
        .get_or_init(|| STOP_TEXT.split_whitespace().collect())
        .contains(word)
}

const STOP_TEXT: &str = "
a
about
after
all
also
am
an
and
another
any
are
as
at
b
be
because
been
before
being
between
both
but
by
c
came
can
come
could
d
did
do
e
each
f
for
from
g
get
got
h
had
has
have
he
her
here
him
himself
his
how
i
if
implement
implements
in
into
is
it
j
k
l
like
m
make
many
me
might
more
most
much
must
my
n
never
now
o
of
on
only
or
other
our
out
over
p
q
r
s
said
same
see
should
since
some
still
such
t
take
than
that
the
their
them
then
there
these
they
this
those
through
to
too
u
under
v
w
x
y
z
";
